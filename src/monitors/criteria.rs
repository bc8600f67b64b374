//! Success criteria of a monitor: accepted status codes and required keywords
//!
//! Both are stored as comma separated text and parsed leniently. Malformed
//! input never fails, it collapses to the defaults.

use std::collections::BTreeSet;
use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Status code accepted when nothing else is configured
pub const DEFAULT_EXPECTED_CODE: u16 = 200;

/// Set of HTTP status codes counted as a successful response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedCodes(BTreeSet<u16>);

impl ExpectedCodes {
    /// Parse a comma separated list such as `"200, 201"`.
    ///
    /// Whitespace around entries is ignored and entries that are not a
    /// positive status code are skipped. An empty result falls back to `{200}`.
    pub fn parse(raw: &str) -> Self {
        let codes: BTreeSet<u16> = raw
            .split(',')
            .filter_map(|part| part.trim().parse::<u16>().ok())
            .filter(|code| *code > 0)
            .collect();

        if codes.is_empty() {
            Self::default()
        } else {
            Self(codes)
        }
    }

    pub fn contains(&self, code: u16) -> bool {
        self.0.contains(&code)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ExpectedCodes {
    fn default() -> Self {
        Self(BTreeSet::from([DEFAULT_EXPECTED_CODE]))
    }
}

impl fmt::Display for ExpectedCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

impl FromIterator<u16> for ExpectedCodes {
    fn from_iter<T: IntoIterator<Item = u16>>(iter: T) -> Self {
        let codes: BTreeSet<u16> = iter.into_iter().filter(|c| *c > 0).collect();
        if codes.is_empty() {
            Self::default()
        } else {
            Self(codes)
        }
    }
}

/// Keywords that must all appear in a response body (case-insensitive)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keywords(Vec<String>);

impl Keywords {
    /// Parse a comma separated list, dropping blank entries.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|keyword| !keyword.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Return the first keyword that does not occur in `body`.
    ///
    /// Keywords are combined with AND: every one of them has to match.
    pub fn first_missing<'a>(&'a self, body: &str) -> Option<&'a str> {
        self.iter().find(|keyword| match keyword_matcher(keyword) {
            Ok(re) => !re.is_match(body),
            Err(_) => true,
        })
    }
}

impl fmt::Display for Keywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

impl<S: Into<String>> FromIterator<S> for Keywords {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .map(|k: String| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }
}

fn keyword_matcher(keyword: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&regex::escape(keyword))
        .case_insensitive(true)
        .build()
}
