//! `topowatch run`: one monitor session against a fixture topology.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use topowatch_config::Config;
use topowatch_core::Monitor;
use topowatch_core::Notification;
use topowatch_core::backend::memory::{ChannelNotifier, MemoryDiscovery, MemoryRepository};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::fixture;
use crate::output;

pub async fn handle(args: &RunArgs, global: &GlobalOpts, config: &Config) -> Result<(), CliError> {
    let monitor_config = config.to_monitor_config()?;
    let fixture = fixture::load_fixture(&args.fixture)?;
    let project_id = args.project.unwrap_or(fixture.project.id);

    let discovery = Arc::new(MemoryDiscovery::new());
    discovery.load(fixture.devices, fixture.links);
    let repo = Arc::new(MemoryRepository::new());
    repo.set_profiles(fixture.profiles);
    repo.insert_project(fixture.project);
    let notifier = Arc::new(ChannelNotifier::new());
    let mut notifications = notifier.subscribe();

    let monitor = Monitor::new(monitor_config, discovery, repo, notifier);
    monitor.start(project_id).await?;
    info!(project_id, "monitoring started");

    let streamed = stream(&mut notifications, args.duration, global.quiet).await;

    info!(
        project_id,
        devices = monitor.current_devices().len(),
        links = monitor.current_links().len(),
        "stopping monitor"
    );
    monitor.stop(project_id).await?;
    streamed
}

/// Print notifications as JSON lines until Ctrl-C or the deadline.
async fn stream(
    rx: &mut broadcast::Receiver<(i64, Notification)>,
    duration: Option<u64>,
    quiet: bool,
) -> Result<(), CliError> {
    let deadline = async move {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(deadline, ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            () = &mut deadline => break,
            received = rx.recv() => match received {
                Ok((_, notification)) => {
                    if !quiet {
                        output::print_line(&output::render_json(&notification, true)?)?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
