//! Owns the camera workers and the periodic gallery refresh.

use crate::extractor::ExtractorFactory;
use crate::worker::{
    spawn_worker, WorkerContext, WorkerError, WorkerHandle, WorkerSettings, WorkerState,
    WorkerStats, WorkerStatsSnapshot,
};
use chrono::{DateTime, Utc};
use roster_core::{AttendanceCommitter, EventSink, GalleryCache};
use roster_hw::SourceOpener;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone)]
pub struct CameraSpec {
    pub id: String,
    pub device: String,
}

/// Shared dependencies for every worker the supervisor starts.
pub struct SupervisorDeps {
    pub cache: Arc<GalleryCache>,
    pub committer: AttendanceCommitter,
    pub events: Arc<dyn EventSink>,
    pub opener: Arc<dyn SourceOpener>,
    pub extractors: Arc<dyn ExtractorFactory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub id: String,
    pub device: String,
    #[serde(flatten)]
    pub stats: WorkerStatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub version: &'static str,
    pub gallery_version: u64,
    pub identities: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub cameras: Vec<CameraStatus>,
}

/// Final state of one worker after shutdown.
#[derive(Debug)]
pub struct WorkerExit {
    pub camera_id: String,
    pub result: Result<(), WorkerError>,
}

struct CameraEntry {
    id: String,
    device: String,
    stats: Arc<WorkerStats>,
}

/// Clone-safe handle for status queries and refresh requests.
#[derive(Clone)]
pub struct SupervisorHandle {
    cache: Arc<GalleryCache>,
    force_refresh: Arc<Notify>,
    cameras: Arc<Vec<CameraEntry>>,
}

impl SupervisorHandle {
    /// Wake the refresh loop now instead of waiting for the next tick.
    pub fn request_refresh(&self) {
        self.force_refresh.notify_one();
    }

    pub fn status(&self) -> SupervisorStatus {
        let snapshot = self.cache.snapshot();
        SupervisorStatus {
            version: env!("CARGO_PKG_VERSION"),
            gallery_version: snapshot.version(),
            identities: snapshot.len(),
            loaded_at: snapshot.loaded_at(),
            cameras: self
                .cameras
                .iter()
                .map(|camera| CameraStatus {
                    id: camera.id.clone(),
                    device: camera.device.clone(),
                    stats: camera.stats.snapshot(),
                })
                .collect(),
        }
    }

    /// True once every worker has stopped or failed.
    pub fn all_workers_done(&self) -> bool {
        self.cameras.iter().all(|camera| {
            matches!(camera.stats.state(), WorkerState::Stopped | WorkerState::Failed)
        })
    }
}

/// Runs one worker thread per camera plus the gallery refresh task.
///
/// Must be started from within a Tokio runtime.
pub struct Supervisor {
    handle: SupervisorHandle,
    workers: Vec<WorkerHandle>,
    refresh_task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
    /// Load the gallery once, then start the refresh task and one worker per camera.
    pub fn start(
        cameras: &[CameraSpec],
        settings: WorkerSettings,
        refresh_interval: Duration,
        deps: SupervisorDeps,
    ) -> Self {
        if let Ok(report) = deps.cache.refresh() {
            tracing::info!(
                version = report.version,
                identities = report.loaded,
                dropped = report.dropped,
                "gallery loaded"
            );
        }

        let force_refresh = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let refresh_task = tokio::spawn(refresh_loop(
            deps.cache.clone(),
            refresh_interval,
            force_refresh.clone(),
            shutdown_rx,
        ));

        let mut workers = Vec::with_capacity(cameras.len());
        let mut entries = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let ctx = WorkerContext {
                camera_id: camera.id.clone(),
                device: camera.device.clone(),
                opener: deps.opener.clone(),
                extractors: deps.extractors.clone(),
                cache: deps.cache.clone(),
                committer: deps.committer.clone(),
                events: deps.events.clone(),
                settings,
            };
            match spawn_worker(ctx) {
                Ok(worker) => {
                    entries.push(CameraEntry {
                        id: camera.id.clone(),
                        device: camera.device.clone(),
                        stats: worker.stats(),
                    });
                    workers.push(worker);
                }
                Err(err) => {
                    tracing::error!(camera = %camera.id, error = %err, "failed to spawn camera worker");
                    let stats = Arc::new(WorkerStats::default());
                    stats.set_state(WorkerState::Failed, Some(err.to_string()));
                    entries.push(CameraEntry {
                        id: camera.id.clone(),
                        device: camera.device.clone(),
                        stats,
                    });
                }
            }
        }

        tracing::info!(cameras = workers.len(), "supervisor started");
        Self {
            handle: SupervisorHandle {
                cache: deps.cache,
                force_refresh,
                cameras: Arc::new(entries),
            },
            workers,
            refresh_task,
            shutdown_tx,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    /// Stop every worker and the refresh task, waiting for all of them.
    pub async fn shutdown(self) -> Vec<WorkerExit> {
        for worker in &self.workers {
            worker.request_stop();
        }
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.refresh_task.await {
            tracing::warn!(error = %err, "gallery refresh task ended abnormally");
        }

        let mut exits = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            let camera_id = worker.camera_id().to_string();
            let result = tokio::task::spawn_blocking(move || worker.join())
                .await
                .unwrap_or(Err(WorkerError::Panicked));
            exits.push(WorkerExit { camera_id, result });
        }
        tracing::info!(workers = exits.len(), "supervisor stopped");
        exits
    }
}

/// Refresh on every tick or forced request until shutdown.
async fn refresh_loop(
    cache: Arc<GalleryCache>,
    interval: Duration,
    force_refresh: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_loaded = cache.snapshot().len();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = force_refresh.notified() => {
                tracing::debug!("forced gallery refresh");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let cache = cache.clone();
        match tokio::task::spawn_blocking(move || cache.refresh()).await {
            Ok(Ok(report)) => {
                if last_loaded != report.loaded {
                    tracing::info!(
                        version = report.version,
                        identities = report.loaded,
                        dropped = report.dropped,
                        "gallery loaded"
                    );
                }
                last_loaded = report.loaded;
            }
            Ok(Err(_)) => {}
            Err(err) => tracing::warn!(error = %err, "gallery refresh task panicked"),
        }
    }
    tracing::debug!("gallery refresh loop stopped");
}
