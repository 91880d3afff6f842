use anyhow::{Context, Result};
use roster_core::{AttendanceCommitter, GalleryCache};
use roster_hw::V4lOpener;
use roster_store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod events;
mod extractor;
mod supervisor;
#[cfg(test)]
mod testing;
mod worker;

use config::Config;
use dbus_interface::RosterService;
use events::EventLog;
use extractor::ProcessExtractorFactory;
use supervisor::{CameraSpec, Supervisor, SupervisorDeps};
use worker::WorkerSettings;

const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rosterd starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        cameras = config.cameras.len(),
        db = %config.db_path.display(),
        confidence_threshold = config.confidence_threshold,
        frames_required = config.frames_required,
        "configuration loaded"
    );

    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("failed to open store at {}", config.db_path.display()))?,
    );
    let events = Arc::new(EventLog::new(config.event_history));

    let cameras: Vec<CameraSpec> = config
        .cameras
        .iter()
        .map(|camera| CameraSpec {
            id: camera.id.clone(),
            device: camera.device.clone(),
        })
        .collect();
    let settings = WorkerSettings {
        threshold: config.distance_threshold(),
        policy: config.confirmation_policy(),
        max_capture_failures: config.max_capture_failures,
    };
    let deps = SupervisorDeps {
        cache: Arc::new(GalleryCache::new(store.clone(), config.expected_dim())),
        committer: AttendanceCommitter::new(store.clone()),
        events: events.clone(),
        opener: Arc::new(V4lOpener {
            dark_ratio: config.dark_frame_ratio,
        }),
        extractors: Arc::new(ProcessExtractorFactory::new(config.extractor_command.clone())),
    };

    let supervisor = Supervisor::start(&cameras, settings, config.refresh_interval(), deps);
    let handle = supervisor.handle();

    let service = RosterService::new(handle.clone(), events);
    let _dbus = match dbus_interface::serve(config.dbus_bus, service).await {
        Ok(connection) => connection,
        Err(err) => {
            tracing::warn!(error = %err, "D-Bus registration failed; continuing without control interface");
            None
        }
    };

    tracing::info!("rosterd ready");

    let mut poll = tokio::time::interval(WORKER_POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                tracing::info!("rosterd shutting down");
                break;
            }
            _ = poll.tick() => {
                if handle.all_workers_done() {
                    tracing::error!("all camera workers have exited; shutting down");
                    break;
                }
            }
        }
    }

    for exit in supervisor.shutdown().await {
        match exit.result {
            Ok(()) => tracing::info!(camera = %exit.camera_id, "worker exited"),
            Err(err) => tracing::warn!(camera = %exit.camera_id, error = %err, "worker exited with error"),
        }
    }
    Ok(())
}
