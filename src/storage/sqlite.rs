//! SQLite record store implementation
//!
//! This module provides a SQLite-based implementation of the `RecordStore` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Monitor tasks write concurrently through a shared pool
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::RecordStore;
use super::error::{StorageError, StorageResult};
use super::schema::{CheckResult, CheckStats, Incident, Monitor, MonitorId, NewMonitor};
use crate::monitors::criteria::{ExpectedCodes, Keywords};
use crate::monitors::status::MonitorStatus;

const MONITOR_COLUMNS: &str = r#"
    id, name, url, enabled, check_interval, timeout, expected_codes, keywords,
    current_status, consecutive_fails, last_check_at, created_at, updated_at
"#;

const CHECK_COLUMNS: &str =
    "id, monitor_id, created_at, status_code, response_time, success, error_message";

const INCIDENT_COLUMNS: &str = r#"
    id, monitor_id, started_at, resolved_at, error_message, notified,
    recovery_notified, created_at, updated_at
"#;

/// SQLite record store
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// Missing parent directories are created first.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db_path_str = db_path.to_string_lossy().to_string();
        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    fn monitor_from_row(row: &SqliteRow) -> Monitor {
        let status: String = row.get("current_status");
        let status = status.parse().unwrap_or_else(|e| {
            warn!("{e}, treating as unknown");
            MonitorStatus::Unknown
        });

        Monitor {
            id: row.get("id"),
            name: row.get("name"),
            url: row.get("url"),
            enabled: row.get("enabled"),
            check_interval: row.get("check_interval"),
            timeout: row.get("timeout"),
            expected_codes: ExpectedCodes::parse(row.get::<&str, _>("expected_codes")),
            keywords: Keywords::parse(row.get::<&str, _>("keywords")),
            status,
            consecutive_fails: row.get::<i64, _>("consecutive_fails").max(0) as u32,
            last_check_at: row
                .get::<Option<i64>, _>("last_check_at")
                .map(Self::millis_to_timestamp),
            created_at: Self::millis_to_timestamp(row.get("created_at")),
            updated_at: Self::millis_to_timestamp(row.get("updated_at")),
        }
    }

    fn check_from_row(row: &SqliteRow) -> CheckResult {
        CheckResult {
            id: row.get("id"),
            monitor_id: row.get("monitor_id"),
            created_at: Self::millis_to_timestamp(row.get("created_at")),
            status_code: row.get::<i64, _>("status_code").clamp(0, u16::MAX as i64) as u16,
            response_time_ms: row.get::<i64, _>("response_time").max(0) as u64,
            success: row.get("success"),
            error_message: row.get("error_message"),
        }
    }

    fn incident_from_row(row: &SqliteRow) -> Incident {
        Incident {
            id: row.get("id"),
            monitor_id: row.get("monitor_id"),
            started_at: Self::millis_to_timestamp(row.get("started_at")),
            resolved_at: row
                .get::<Option<i64>, _>("resolved_at")
                .map(Self::millis_to_timestamp),
            error_message: row.get("error_message"),
            notified: row.get("notified"),
            recovery_notified: row.get("recovery_notified"),
            created_at: Self::millis_to_timestamp(row.get("created_at")),
            updated_at: Self::millis_to_timestamp(row.get("updated_at")),
        }
    }
}

#[async_trait]
impl RecordStore for SqliteBackend {
    #[instrument(skip(self, monitor), fields(url = %monitor.url))]
    async fn create_monitor(&self, monitor: NewMonitor) -> StorageResult<Monitor> {
        let now = Utc::now();
        // the id is assigned below; build the record first to apply name defaults
        let record = monitor.into_monitor(0, now);

        let result = sqlx::query(
            r#"
            INSERT INTO monitors (
                name, url, enabled, check_interval, timeout, expected_codes, keywords,
                current_status, consecutive_fails, last_check_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.name)
        .bind(&record.url)
        .bind(record.enabled)
        .bind(record.check_interval)
        .bind(record.timeout)
        .bind(record.expected_codes.to_string())
        .bind(record.keywords.to_string())
        .bind(record.status.as_str())
        .bind(record.consecutive_fails as i64)
        .bind(record.last_check_at.as_ref().map(Self::timestamp_to_millis))
        .bind(Self::timestamp_to_millis(&record.created_at))
        .bind(Self::timestamp_to_millis(&record.updated_at))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("created monitor {id}");

        Ok(Monitor { id, ..record })
    }

    async fn get_monitor(&self, id: MonitorId) -> StorageResult<Option<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::monitor_from_row))
    }

    async fn get_monitor_by_url(&self, url: &str) -> StorageResult<Option<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE url = ?");
        let row = sqlx::query(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::monitor_from_row))
    }

    async fn list_monitors(&self) -> StorageResult<Vec<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(Self::monitor_from_row).collect())
    }

    async fn list_enabled_monitors(&self) -> StorageResult<Vec<Monitor>> {
        let sql =
            format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE enabled = 1 ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(Self::monitor_from_row).collect())
    }

    #[instrument(skip(self, monitor), fields(monitor_id = monitor.id))]
    async fn update_monitor(&self, monitor: &Monitor) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE monitors SET
                name = ?, url = ?, enabled = ?, check_interval = ?, timeout = ?,
                expected_codes = ?, keywords = ?, current_status = ?,
                consecutive_fails = ?, last_check_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&monitor.name)
        .bind(&monitor.url)
        .bind(monitor.enabled)
        .bind(monitor.check_interval)
        .bind(monitor.timeout)
        .bind(monitor.expected_codes.to_string())
        .bind(monitor.keywords.to_string())
        .bind(monitor.status.as_str())
        .bind(monitor.consecutive_fails as i64)
        .bind(monitor.last_check_at.as_ref().map(Self::timestamp_to_millis))
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .bind(monitor.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("monitor {}", monitor.id)));
        }
        Ok(())
    }

    async fn record_monitor_state(&self, monitor: &Monitor) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE monitors SET
                current_status = ?, consecutive_fails = ?, last_check_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(monitor.status.as_str())
        .bind(monitor.consecutive_fails as i64)
        .bind(monitor.last_check_at.as_ref().map(Self::timestamp_to_millis))
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .bind(monitor.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("monitor {}", monitor.id)));
        }
        Ok(())
    }

    async fn set_monitor_enabled(&self, id: MonitorId, enabled: bool) -> StorageResult<()> {
        let result = sqlx::query("UPDATE monitors SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Self::timestamp_to_millis(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("monitor {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_monitor(&self, id: MonitorId) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM check_results WHERE monitor_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM incidents WHERE monitor_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM monitors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StorageError::NotFound(format!("monitor {id}")));
        }

        tx.commit().await?;
        info!("deleted monitor {id} and its history");
        Ok(())
    }

    async fn insert_check_result(&self, result: &CheckResult) -> StorageResult<i64> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO check_results (
                monitor_id, created_at, status_code, response_time, success, error_message
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.monitor_id)
        .bind(Self::timestamp_to_millis(&result.created_at))
        .bind(result.status_code as i64)
        .bind(result.response_time_ms.min(i64::MAX as u64) as i64)
        .bind(result.success)
        .bind(&result.error_message)
        .execute(&self.pool)
        .await?;

        Ok(inserted.last_insert_rowid())
    }

    async fn recent_check_results(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> StorageResult<Vec<CheckResult>> {
        let sql = format!(
            "SELECT {CHECK_COLUMNS} FROM check_results WHERE monitor_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(monitor_id)
            .bind(limit.min(i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::check_from_row).collect())
    }

    async fn check_results_since(
        &self,
        monitor_id: MonitorId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<CheckResult>> {
        let sql = format!(
            "SELECT {CHECK_COLUMNS} FROM check_results WHERE monitor_id = ? AND created_at >= ? \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(monitor_id)
            .bind(Self::timestamp_to_millis(&since))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::check_from_row).collect())
    }

    async fn check_stats(
        &self,
        monitor_id: MonitorId,
        since: DateTime<Utc>,
    ) -> StorageResult<CheckStats> {
        let row: (i64, Option<i64>, Option<f64>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                SUM(success),
                AVG(CASE WHEN success = 1 THEN response_time END)
            FROM check_results
            WHERE monitor_id = ? AND created_at >= ?
            "#,
        )
        .bind(monitor_id)
        .bind(Self::timestamp_to_millis(&since))
        .fetch_one(&self.pool)
        .await?;

        Ok(CheckStats {
            total: row.0.max(0) as u64,
            successful: row.1.unwrap_or(0).max(0) as u64,
            avg_response_ms: row.2.unwrap_or(0.0),
        })
    }

    #[instrument(skip(self, error_message))]
    async fn create_incident(
        &self,
        monitor_id: MonitorId,
        started_at: DateTime<Utc>,
        error_message: &str,
    ) -> StorageResult<Incident> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO incidents (
                monitor_id, started_at, resolved_at, error_message, notified,
                recovery_notified, created_at, updated_at
            )
            VALUES (?, ?, NULL, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(monitor_id)
        .bind(Self::timestamp_to_millis(&started_at))
        .bind(error_message)
        .bind(Self::timestamp_to_millis(&now))
        .bind(Self::timestamp_to_millis(&now))
        .execute(&self.pool)
        .await?;

        Ok(Incident {
            id: result.last_insert_rowid(),
            monitor_id,
            started_at,
            resolved_at: None,
            error_message: error_message.to_string(),
            notified: false,
            recovery_notified: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn active_incident(&self, monitor_id: MonitorId) -> StorageResult<Option<Incident>> {
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents \
             WHERE monitor_id = ? AND resolved_at IS NULL LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(monitor_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::incident_from_row))
    }

    async fn resolve_incident(&self, id: i64, resolved_at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query("UPDATE incidents SET resolved_at = ?, updated_at = ? WHERE id = ?")
            .bind(Self::timestamp_to_millis(&resolved_at))
            .bind(Self::timestamp_to_millis(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("incident {id}")));
        }
        Ok(())
    }

    async fn update_incident(&self, incident: &Incident) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE incidents SET
                resolved_at = ?, error_message = ?, notified = ?, recovery_notified = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(incident.resolved_at.as_ref().map(Self::timestamp_to_millis))
        .bind(&incident.error_message)
        .bind(incident.notified)
        .bind(incident.recovery_notified)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .bind(incident.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("incident {}", incident.id)));
        }
        Ok(())
    }

    async fn recent_incidents(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> StorageResult<Vec<Incident>> {
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_id = ? \
             ORDER BY started_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(monitor_id)
            .bind(limit.min(i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::incident_from_row).collect())
    }

    async fn all_recent_incidents(&self, limit: usize) -> StorageResult<Vec<Incident>> {
        let sql = format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents ORDER BY started_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(limit.min(i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::incident_from_row).collect())
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
