//! Command-line interface for Topic Fetcher
//!
//! A thin front-end over the library: `download` enqueues topics against
//! the real backend client, disk probe, and JSON store, rendering progress
//! bars from a hub subscription; `status` prints the persisted snapshot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::warn;

use crate::app::{
    spawn_network_listener, spawn_periodic_wake, ClientConfig, DiskProbe, DownloadOptions,
    DownloadScheduler, DownloadStatus, JsonTaskStore, NetworkMonitor, SchedulerConfig,
    TaskSnapshot, TaskStore, TopicClient, TopicId,
};
use crate::constants::{files, scheduler};
use crate::errors::{AppError, Result};

/// Offline topic download manager
#[derive(Debug, Parser)]
#[command(name = "topicdl", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Tracing level derived from verbosity flags
    pub fn log_level(&self) -> &'static str {
        match self.global.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Flags shared by all commands
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// State and download directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download one or more topics for offline use
    Download(DownloadArgs),
    /// Show the persisted download state
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Topic identifiers to download
    #[arg(required = true)]
    pub topics: Vec<String>,

    /// Scheduling priority; higher is served first
    #[arg(short, long, default_value_t = 1)]
    pub priority: i32,

    /// Backend base URL override
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {}

/// Resolve the application state directory
fn state_dir(global: &GlobalArgs) -> PathBuf {
    global.dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(files::APP_DIR_NAME)
    })
}

/// Handle the `download` command
pub async fn handle_download(global: &GlobalArgs, args: DownloadArgs) -> Result<()> {
    let base_dir = state_dir(global);
    let config = SchedulerConfig {
        max_concurrent: scheduler::MAX_CONCURRENT_DOWNLOADS,
        download_dir: base_dir.join(files::TOPICS_DIR_NAME),
    };

    let store = Arc::new(JsonTaskStore::new(&base_dir).await?);
    let probe = Arc::new(DiskProbe::new(&base_dir));
    let client_config = match &args.base_url {
        Some(base_url) => ClientConfig {
            base_url: base_url.clone(),
            ..Default::default()
        },
        None => ClientConfig::default(),
    };
    let client = Arc::new(TopicClient::with_config(client_config)?);
    // The CLI has no platform connectivity feed; assume connected and let
    // transfer failures surface through task state
    let network = Arc::new(NetworkMonitor::default());

    let sched = DownloadScheduler::new(config, client, probe, store, network);
    sched.restore().await?;

    let listener = spawn_network_listener(Arc::clone(&sched), sched.network().subscribe());
    let wake = spawn_periodic_wake(Arc::clone(&sched), scheduler::BACKGROUND_WAKE_INTERVAL);

    let subscription = sched.subscribe(progress_renderer());

    let topics: Vec<TopicId> = args.topics.iter().map(|t| TopicId::new(t.clone())).collect();
    let mut enqueued = Vec::new();
    for topic in &topics {
        match sched
            .enqueue(topic.clone(), DownloadOptions::with_priority(args.priority))
            .await
        {
            Ok(task_id) => enqueued.push((topic.clone(), task_id)),
            Err(e) => warn!(topic = %topic, error = %e, "Could not enqueue topic"),
        }
    }
    if enqueued.is_empty() {
        sched.unsubscribe(subscription);
        listener.abort();
        wake.abort();
        return Err(AppError::generic("no topics could be enqueued"));
    }

    // Wait until every enqueued topic settles (completed, errored, or
    // cancelled out from under us)
    loop {
        let tasks =
            futures::future::join_all(enqueued.iter().map(|(topic, _)| sched.get_task(topic)))
                .await;
        let settled = tasks.iter().all(|task| match task {
            Some(task) => matches!(
                task.status,
                DownloadStatus::Completed | DownloadStatus::Error
            ),
            None => true,
        });
        if settled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    sched.unsubscribe(subscription);
    listener.abort();
    wake.abort();

    let mut failures = 0;
    for (topic, _) in &enqueued {
        if let Some(task) = sched.get_task(topic).await {
            match task.status {
                DownloadStatus::Completed => println!("{}: completed", topic),
                DownloadStatus::Error => {
                    failures += 1;
                    println!(
                        "{}: failed ({})",
                        topic,
                        task.error.as_deref().unwrap_or("unknown error")
                    );
                }
                other => println!("{}: {}", topic, other),
            }
        }
    }

    if failures > 0 {
        Err(AppError::generic(format!(
            "{} of {} downloads failed",
            failures,
            enqueued.len()
        )))
    } else {
        Ok(())
    }
}

/// Build a hub subscriber that renders one progress bar per topic
fn progress_renderer() -> crate::app::SubscriberFn {
    let multi = MultiProgress::new();
    let bars: Mutex<HashMap<TopicId, ProgressBar>> = Mutex::new(HashMap::new());
    let style = ProgressStyle::with_template(
        "{msg:20} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {percent}%",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    Arc::new(move |snapshot: &TaskSnapshot| {
        let mut bars = bars.lock().expect("progress bar lock poisoned");
        for (topic, task) in snapshot {
            let bar = bars.entry(topic.clone()).or_insert_with(|| {
                let bar = multi.add(ProgressBar::new(task.size_bytes.max(1)));
                bar.set_style(style.clone());
                bar.set_message(topic.to_string());
                bar
            });
            bar.set_length(task.size_bytes.max(1));
            bar.set_position(task.downloaded_bytes);
            match task.status {
                DownloadStatus::Completed => bar.finish(),
                DownloadStatus::Error | DownloadStatus::Cancelled => bar.abandon(),
                _ => {}
            }
        }
    })
}

/// Handle the `status` command
pub async fn handle_status(global: &GlobalArgs, _args: StatusArgs) -> Result<()> {
    let base_dir = state_dir(global);
    let store = JsonTaskStore::new(&base_dir).await?;

    let snapshot = store.restore().await?;
    match snapshot {
        Some(tasks) if !tasks.is_empty() => {
            println!(
                "{:<24} {:<12} {:>8} {:>14}",
                "TOPIC", "STATUS", "PROG", "BYTES"
            );
            let mut rows: Vec<_> = tasks.values().collect();
            rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            for task in rows {
                println!(
                    "{:<24} {:<12} {:>7.1}% {:>6}/{:<7}",
                    task.topic_id,
                    task.status.to_string(),
                    task.progress,
                    task.downloaded_bytes,
                    task.size_bytes,
                );
            }
        }
        _ => println!("No download tasks recorded."),
    }

    let downloaded = store.downloaded_topics().await?;
    if !downloaded.is_empty() {
        let mut topics: Vec<_> = downloaded.iter().map(|t| t.to_string()).collect();
        topics.sort();
        println!("\nDownloaded topics: {}", topics.join(", "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_download_command() {
        let cli = Cli::try_parse_from(["topicdl", "download", "algebra", "-p", "5"]).unwrap();
        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.topics, vec!["algebra"]);
                assert_eq!(args.priority, 5);
            }
            _ => panic!("expected download command"),
        }
    }

    #[test]
    fn test_cli_requires_topics() {
        assert!(Cli::try_parse_from(["topicdl", "download"]).is_err());
    }

    #[tokio::test]
    async fn test_scheduler_wiring_accepts_concrete_collaborators() {
        // The same construction handle_download performs: concrete Arcs
        // must coerce to the scheduler's trait-object parameters
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonTaskStore::new(dir.path()).await.unwrap());
        let client = Arc::new(TopicClient::new().unwrap());
        let probe = Arc::new(DiskProbe::new(dir.path()));

        let sched = DownloadScheduler::new(
            SchedulerConfig::for_testing(dir.path().join("topics")),
            client,
            probe,
            store,
            Arc::new(NetworkMonitor::default()),
        );
        assert_eq!(sched.stats().await.queued, 0);
    }

    #[test]
    fn test_verbosity_maps_to_levels() {
        let cli = Cli::try_parse_from(["topicdl", "-vv", "status"]).unwrap();
        assert_eq!(cli.log_level(), "trace");

        let cli = Cli::try_parse_from(["topicdl", "status"]).unwrap();
        assert_eq!(cli.log_level(), "info");
    }
}
