mod config;
mod metrics;
mod notifier;
mod watcher;

use clap::Parser;
use common::notice::{LogSink, NotificationSink};
use common::session::session_from_config;
use common::{ApiClient, JobPoller};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

use config::{Config, LoggingConfig};
use metrics::MetricsCollector;
use notifier::Notifier;
use watcher::Watcher;

const EVENTS_TARGET: &str = "job_events";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Watches training jobs, engineer applications and AI service health"
)]
struct Args {
    /// YAML or TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print the effective configuration and exit
    #[arg(long)]
    check: bool,
    /// Run one refresh of everything, print metrics and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::discover(args.config.as_deref())?;

    if args.check {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    setup_logging(&config.logging)?;
    log::info!("Starting assistdesk-watcher against {}", config.api.base_url);

    let session = session_from_config(&config.api);
    let client = Arc::new(ApiClient::new(&config.api, session)?);
    let metrics = Arc::new(MetricsCollector::new());
    let notifier = Arc::new(Notifier::new(config.notifications.clone()));
    let sink: Arc<dyn NotificationSink> = Arc::new(LogSink);
    log::info!("{} notification channel(s) configured", config.notifications.len());

    let (watcher, mut jobs_rx) = Watcher::new(client, notifier, metrics.clone(), sink.clone());

    if args.once {
        watcher.overview_tick().await;
        watcher.health_tick().await;
        print!("{}", metrics.export());
        return Ok(());
    }

    let mut poller = JobPoller::new(
        "training jobs",
        config.polling.training_jobs_interval(),
        watcher.clone(),
        sink,
    );

    let mut overview = tokio::time::interval(config.polling.pending_interval());
    overview.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut health = tokio::time::interval(config.polling.health_interval());
    health.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Received Ctrl-C, shutting down");
                break;
            }
            _ = overview.tick() => {
                watcher.overview_tick().await;
                if let Some(path) = &config.metrics.path {
                    if let Err(e) = metrics.write_to(path) {
                        log::error!("Failed to write metrics to {:?}: {}", path, e);
                    }
                }
            }
            _ = health.tick() => watcher.health_tick().await,
            changed = jobs_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let polling = {
                    let jobs = jobs_rx.borrow_and_update();
                    poller.observe(jobs.as_slice())
                };
                log::debug!(
                    "Training job poller armed: {} (every {:?})",
                    polling,
                    poller.interval()
                );
            }
        }
    }

    drop(poller);
    log::info!("assistdesk-watcher stopped");
    Ok(())
}

fn open_log(explicit: Option<&Path>, system: &str, user: &str) -> anyhow::Result<std::fs::File> {
    if let Some(path) = explicit {
        return Ok(fern::log_file(path)?);
    }
    match fern::log_file(system) {
        Ok(file) => Ok(file),
        Err(_) => Ok(fern::log_file(user)?),
    }
}

fn setup_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let main_file = open_log(
        logging.output.as_deref(),
        common::DEFAULT_LOG_FILE,
        common::USER_LOG_FILE,
    )?;
    let events_file = open_log(
        logging.events_output.as_deref(),
        common::DEFAULT_EVENTS_LOG_FILE,
        common::USER_EVENTS_LOG_FILE,
    )?;

    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(logging.level_filter())
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn);

    // Transitions go to stdout and the events file, not the main file
    let main_log = fern::Dispatch::new()
        .filter(|metadata| metadata.target() != EVENTS_TARGET)
        .chain(main_file);

    let events_log = fern::Dispatch::new()
        .filter(|metadata| metadata.target() == EVENTS_TARGET)
        .chain(events_file);

    base_config
        .chain(std::io::stdout())
        .chain(main_log)
        .chain(events_log)
        .apply()?;

    Ok(())
}
