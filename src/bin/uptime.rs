use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use uptime_monitoring::{
    alerts::AlertManager,
    config::{Config, read_config_file},
    monitors::criteria::{ExpectedCodes, Keywords},
    monitors::status::{Availability, MonitorStatus},
    scheduler::Scheduler,
    storage::{self, MonitorId, NewMonitor, RecordStore},
    util::get_config_path,
};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "HTTP uptime monitoring")]
struct Args {
    /// Config file (defaults to ~/.config/uptime/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Check every enabled monitor until interrupted
    Run,

    /// Add a monitor
    Add {
        url: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Seconds between checks
        #[arg(short, long, default_value_t = 60)]
        interval: i64,

        /// Request timeout in seconds
        #[arg(short, long, default_value_t = 10)]
        timeout: i64,

        /// Accepted status codes, comma separated
        #[arg(long, default_value = "200")]
        codes: String,

        /// Keywords that must appear in the body, comma separated
        #[arg(long, default_value = "")]
        keywords: String,

        /// Create the monitor disabled
        #[arg(long)]
        disabled: bool,
    },

    /// List monitors with their last known status
    List,

    /// Remove a monitor and its history
    Remove { id: MonitorId },

    Enable { id: MonitorId },

    Disable { id: MonitorId },

    /// Show recent incidents
    Incidents {
        #[arg(short, long)]
        monitor: Option<MonitorId>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Uptime and latency of a monitor
    Stats {
        id: MonitorId,

        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("uptime_monitoring", level),
        ("uptime", level),
        ("sqlx", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let explicit = path.is_some();
    let path = path.unwrap_or_else(get_config_path);

    if !path.exists() {
        if explicit {
            bail!("config file {} does not exist", path.display());
        }
        debug!("no config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    read_config_file(&path.to_string_lossy())
        .with_context(|| format!("failed to read config file {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = load_config(args.config)?;
    let store = storage::open(&config.storage)
        .await
        .context("failed to open record store")?;

    let result = match args.command {
        Command::Run => run(&config, store.clone()).await,
        Command::Add {
            url,
            name,
            interval,
            timeout,
            codes,
            keywords,
            disabled,
        } => {
            let mut monitor = NewMonitor::new(url)
                .check_interval(interval)
                .timeout(timeout)
                .expected_codes(ExpectedCodes::parse(&codes))
                .keywords(Keywords::parse(&keywords))
                .enabled(!disabled);
            if let Some(name) = name {
                monitor = monitor.name(name);
            }

            let monitor = store.create_monitor(monitor).await?;
            println!("added monitor {} ({})", monitor.id, monitor.url);
            Ok(())
        }
        Command::List => list(store.as_ref()).await,
        Command::Remove { id } => {
            store.delete_monitor(id).await?;
            println!("removed monitor {id}");
            Ok(())
        }
        Command::Enable { id } => {
            store.set_monitor_enabled(id, true).await?;
            println!("enabled monitor {id}");
            Ok(())
        }
        Command::Disable { id } => {
            store.set_monitor_enabled(id, false).await?;
            println!("disabled monitor {id}");
            Ok(())
        }
        Command::Incidents { monitor, limit } => incidents(store.as_ref(), monitor, limit).await,
        Command::Stats { id, hours } => stats(store.as_ref(), id, hours).await,
    };

    store.close().await?;
    result
}

async fn run(config: &Config, store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    let notifier = Arc::new(
        AlertManager::new(config.alerts.clone()).context("failed to build alert client")?,
    );
    let scheduler = Scheduler::new(store, notifier, config.engine.clone())
        .context("failed to build HTTP client")?;

    scheduler.start().await?;
    info!("scheduler started with {} monitors", scheduler.scheduled_count().await);

    let mut report = interval(Duration::from_secs(config.status_report_secs.max(1)));
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // picks up add/remove/enable/disable run from another shell
    let mut sync = interval(Duration::from_secs(config.sync_interval_secs.max(1)));
    sync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    sync.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("failed to listen for ctrl-c: {e}");
                }
                break;
            }
            _ = report.tick() => {
                let snapshot = scheduler.status_snapshot().await;
                let count = |status| snapshot.values().filter(|s| **s == status).count();
                debug!(
                    "{} up, {} down, {} unknown",
                    count(MonitorStatus::Up),
                    count(MonitorStatus::Down),
                    count(MonitorStatus::Unknown)
                );
            }
            _ = sync.tick() => {
                if let Err(e) = scheduler.sync().await {
                    warn!("failed to sync monitors: {e}");
                }
            }
        }
    }

    info!("shutting down");
    scheduler.stop().await;
    Ok(())
}

async fn list(store: &dyn RecordStore) -> anyhow::Result<()> {
    let monitors = store.list_monitors().await?;
    if monitors.is_empty() {
        println!("no monitors configured");
        return Ok(());
    }

    for monitor in monitors {
        let latest = store.recent_check_results(monitor.id, 1).await?;
        let availability = Availability::classify(monitor.status, latest.first());
        let latency = latest
            .first()
            .filter(|check| check.success)
            .map(|check| format!("{}ms", check.response_time_ms))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{} {:>4}  {:<24} {:<8} {:>7}  {}{}",
            availability.symbol(),
            monitor.id,
            monitor.name,
            monitor.status,
            latency,
            monitor.url,
            if monitor.enabled { "" } else { "  (disabled)" }
        );
    }
    Ok(())
}

async fn incidents(
    store: &dyn RecordStore,
    monitor: Option<MonitorId>,
    limit: usize,
) -> anyhow::Result<()> {
    let incidents = match monitor {
        Some(id) => store.recent_incidents(id, limit).await?,
        None => store.all_recent_incidents(limit).await?,
    };

    let now = Utc::now();
    for incident in incidents {
        let state = match incident.resolved_at {
            Some(at) => format!("resolved {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => "ongoing".to_string(),
        };
        println!(
            "#{} monitor {} since {} ({}, {}s): {}",
            incident.id,
            incident.monitor_id,
            incident.started_at.format("%Y-%m-%d %H:%M:%S"),
            state,
            incident.duration(now).num_seconds(),
            incident.error_message
        );
    }
    Ok(())
}

/// Start of a statistics window of `hours` (at least one) ending at `now`
fn stats_since(now: DateTime<Utc>, hours: i64) -> anyhow::Result<DateTime<Utc>> {
    TimeDelta::try_hours(hours.max(1))
        .and_then(|window| now.checked_sub_signed(window))
        .with_context(|| format!("--hours {hours} is out of range"))
}

async fn stats(store: &dyn RecordStore, id: MonitorId, hours: i64) -> anyhow::Result<()> {
    let monitor = store
        .get_monitor(id)
        .await?
        .with_context(|| format!("monitor {id} not found"))?;

    let since = stats_since(Utc::now(), hours)?;
    let stats = store.check_stats(id, since).await?;

    println!("{} ({})", monitor.name, monitor.url);
    println!("  status:       {}", monitor.status);
    println!("  checks:       {} ({} successful)", stats.total, stats.successful);
    println!("  uptime:       {:.2}%", stats.uptime_percent());
    println!("  avg response: {:.0}ms", stats.avg_response_ms);
    Ok(())
}
