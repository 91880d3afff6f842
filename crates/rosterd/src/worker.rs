//! Per-camera recognition worker.
//!
//! Each camera runs on its own OS thread: capture, detect, embed, match
//! against the current gallery snapshot, debounce, and commit attendance.

use crate::extractor::ExtractorFactory;
use roster_core::{
    AttendanceCommitter, CommitOutcome, ConfirmationPolicy, ConfirmationTracker, EmbeddingExtractor,
    EuclideanMatcher, EventSink, ExtractError, FrameMatch, GalleryCache, MatchResult, Matcher,
    PeriodKey, Probe, RosterEvent,
};
use roster_hw::{CameraError, Frame, SourceOpener};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractError),
    #[error("{count} consecutive capture failures, last: {last}")]
    CaptureFailures { count: u32, last: CameraError },
    #[error("worker thread panicked")]
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Starting,
    Running,
    Stopped,
    Failed,
}

/// Counters shared between a worker thread and status readers.
#[derive(Debug)]
pub struct WorkerStats {
    frames: AtomicU64,
    dark_frames: AtomicU64,
    faces: AtomicU64,
    confirmations: AtomicU64,
    commits: AtomicU64,
    duplicates: AtomicU64,
    commit_failures: AtomicU64,
    capture_failures: AtomicU64,
    extractor_failures: AtomicU64,
    state: Mutex<(WorkerState, Option<String>)>,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self {
            frames: AtomicU64::new(0),
            dark_frames: AtomicU64::new(0),
            faces: AtomicU64::new(0),
            confirmations: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            commit_failures: AtomicU64::new(0),
            capture_failures: AtomicU64::new(0),
            extractor_failures: AtomicU64::new(0),
            state: Mutex::new((WorkerState::Starting, None)),
        }
    }
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub state: WorkerState,
    pub last_error: Option<String>,
    pub frames: u64,
    pub dark_frames: u64,
    pub faces: u64,
    pub confirmations: u64,
    pub commits: u64,
    pub duplicates: u64,
    pub commit_failures: u64,
    pub capture_failures: u64,
    pub extractor_failures: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        let (state, last_error) = self.state.lock().unwrap_or_else(|p| p.into_inner()).clone();
        WorkerStatsSnapshot {
            state,
            last_error,
            frames: self.frames.load(Ordering::Relaxed),
            dark_frames: self.dark_frames.load(Ordering::Relaxed),
            faces: self.faces.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            extractor_failures: self.extractor_failures.load(Ordering::Relaxed),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).0
    }

    pub(crate) fn set_state(&self, state: WorkerState, error: Option<String>) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = (state, error);
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Euclidean distance threshold for a match.
    pub threshold: f32,
    pub policy: ConfirmationPolicy,
    pub max_capture_failures: u32,
}

/// What happened to one frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameOutcome {
    pub faces: usize,
    pub matched: Vec<String>,
    pub confirmed: Vec<String>,
    /// Extraction failed; the tracker was left untouched.
    pub skipped: bool,
}

/// Recognition pipeline for one camera, independent of capture.
pub struct FramePipeline {
    camera_id: String,
    extractor: Box<dyn EmbeddingExtractor>,
    matcher: EuclideanMatcher,
    tracker: ConfirmationTracker,
    threshold: f32,
    cache: Arc<GalleryCache>,
    committer: AttendanceCommitter,
    events: Arc<dyn EventSink>,
    stats: Arc<WorkerStats>,
}

impl FramePipeline {
    pub fn new(
        camera_id: &str,
        extractor: Box<dyn EmbeddingExtractor>,
        cache: Arc<GalleryCache>,
        committer: AttendanceCommitter,
        events: Arc<dyn EventSink>,
        settings: WorkerSettings,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            extractor,
            matcher: EuclideanMatcher,
            tracker: ConfirmationTracker::new(camera_id, settings.policy),
            threshold: settings.threshold,
            cache,
            committer,
            events,
            stats,
        }
    }

    pub fn process(&mut self, frame: &Frame) -> FrameOutcome {
        WorkerStats::bump(&self.stats.frames, 1);
        let mut outcome = FrameOutcome::default();

        if frame.is_dark {
            WorkerStats::bump(&self.stats.dark_frames, 1);
            tracing::trace!(camera = %self.camera_id, sequence = frame.sequence, "dark frame");
            self.confirm(&[], frame, &mut outcome);
            return outcome;
        }

        let regions = match self
            .extractor
            .detect_faces(&frame.data, frame.width, frame.height)
        {
            Ok(regions) => regions,
            Err(err) => {
                WorkerStats::bump(&self.stats.extractor_failures, 1);
                tracing::warn!(camera = %self.camera_id, error = %err, "face detection failed; frame skipped");
                outcome.skipped = true;
                return outcome;
            }
        };

        outcome.faces = regions.len();
        let mut matches = Vec::new();
        if !regions.is_empty() {
            WorkerStats::bump(&self.stats.faces, regions.len() as u64);
            self.events.emit(RosterEvent::FaceDetected {
                camera_id: self.camera_id.clone(),
                faces: regions.len(),
            });

            let snapshot = self.cache.snapshot();
            for region in regions {
                let embedding = match self
                    .extractor
                    .embed(&frame.data, frame.width, frame.height, &region)
                {
                    Ok(Some(embedding)) => embedding,
                    Ok(None) => {
                        tracing::debug!(camera = %self.camera_id, "face without embedding");
                        continue;
                    }
                    Err(err) => {
                        WorkerStats::bump(&self.stats.extractor_failures, 1);
                        tracing::warn!(camera = %self.camera_id, error = %err, "embedding failed; frame skipped");
                        outcome.skipped = true;
                        return outcome;
                    }
                };

                let probe = Probe {
                    camera_id: self.camera_id.clone(),
                    frame_timestamp: frame.timestamp,
                    region,
                    embedding,
                };
                match self.matcher.compare(&probe.embedding, &snapshot, self.threshold) {
                    MatchResult::Matched {
                        identity_id,
                        display_name,
                        distance,
                        confidence,
                    } => {
                        tracing::debug!(
                            camera = %probe.camera_id,
                            identity = %identity_id,
                            distance,
                            gallery_version = snapshot.version(),
                            "face matched"
                        );
                        matches.push(FrameMatch {
                            identity_id,
                            display_name,
                            confidence,
                        });
                    }
                    MatchResult::Unknown { nearest_distance } => {
                        tracing::debug!(
                            camera = %probe.camera_id,
                            nearest = ?nearest_distance,
                            x = probe.region.x,
                            y = probe.region.y,
                            "unknown face"
                        );
                    }
                }
            }
        }

        outcome.matched = matches.iter().map(|m| m.identity_id.clone()).collect();
        self.confirm(&matches, frame, &mut outcome);
        outcome
    }

    fn confirm(&mut self, matches: &[FrameMatch], frame: &Frame, outcome: &mut FrameOutcome) {
        let confirmations = self.tracker.observe(matches, frame.timestamp);
        if confirmations.is_empty() {
            return;
        }

        let period = PeriodKey::today();
        for confirmation in confirmations {
            WorkerStats::bump(&self.stats.confirmations, 1);
            outcome.confirmed.push(confirmation.identity_id.clone());
            self.events.emit(RosterEvent::IdentityConfirmed {
                camera_id: confirmation.camera_id.clone(),
                identity_id: confirmation.identity_id.clone(),
                display_name: confirmation.display_name,
                confidence: confirmation.confidence,
            });

            match self.committer.commit(&confirmation.identity_id, &period) {
                Ok(result) => {
                    let counter = match result {
                        CommitOutcome::Created => &self.stats.commits,
                        CommitOutcome::AlreadyPresent => &self.stats.duplicates,
                    };
                    WorkerStats::bump(counter, 1);
                    self.events.emit(RosterEvent::AttendanceCommitted {
                        camera_id: confirmation.camera_id,
                        identity_id: confirmation.identity_id,
                        period_key: period.clone(),
                        outcome: result,
                    });
                }
                Err(_) => WorkerStats::bump(&self.stats.commit_failures, 1),
            }
        }
    }
}

/// Everything a worker thread needs.
pub struct WorkerContext {
    pub camera_id: String,
    pub device: String,
    pub opener: Arc<dyn SourceOpener>,
    pub extractors: Arc<dyn ExtractorFactory>,
    pub cache: Arc<GalleryCache>,
    pub committer: AttendanceCommitter,
    pub events: Arc<dyn EventSink>,
    pub settings: WorkerSettings,
}

pub struct WorkerHandle {
    camera_id: String,
    stop: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    thread: JoinHandle<Result<(), WorkerError>>,
}

impl WorkerHandle {
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Ask the worker to exit after its current frame.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait for the thread to exit.
    pub fn join(self) -> Result<(), WorkerError> {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => {
                self.stats
                    .set_state(WorkerState::Failed, Some(WorkerError::Panicked.to_string()));
                Err(WorkerError::Panicked)
            }
        }
    }
}

/// Spawn a camera worker on a dedicated OS thread.
///
/// Opening the camera or the extractor happens on the new thread; a
/// failure or panic there ends this worker only and is reported through
/// its stats and its join result.
pub fn spawn_worker(ctx: WorkerContext) -> std::io::Result<WorkerHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(WorkerStats::default());
    let camera_id = ctx.camera_id.clone();

    let thread = std::thread::Builder::new()
        .name(format!("roster-{camera_id}"))
        .spawn({
            let stop = stop.clone();
            let stats = stats.clone();
            move || {
                let camera_id = ctx.camera_id.clone();
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| run_worker(ctx, &stop, &stats)))
                    .unwrap_or(Err(WorkerError::Panicked));
                match &result {
                    Ok(()) => {
                        tracing::info!(camera = %camera_id, "camera worker stopped");
                        stats.set_state(WorkerState::Stopped, None);
                    }
                    Err(err) => {
                        tracing::error!(camera = %camera_id, error = %err, "camera worker failed");
                        stats.set_state(WorkerState::Failed, Some(err.to_string()));
                    }
                }
                result
            }
        })?;

    Ok(WorkerHandle {
        camera_id,
        stop,
        stats,
        thread,
    })
}

fn run_worker(
    ctx: WorkerContext,
    stop: &AtomicBool,
    stats: &Arc<WorkerStats>,
) -> Result<(), WorkerError> {
    let mut source = ctx.opener.open(&ctx.device)?;
    let extractor = ctx.extractors.create(&ctx.camera_id)?;
    tracing::info!(
        camera = %ctx.camera_id,
        source = %source.describe(),
        "camera worker started"
    );

    let mut pipeline = FramePipeline::new(
        &ctx.camera_id,
        extractor,
        ctx.cache,
        ctx.committer,
        ctx.events,
        ctx.settings,
        stats.clone(),
    );
    stats.set_state(WorkerState::Running, None);

    let limit = ctx.settings.max_capture_failures.max(1);
    let mut failures = 0u32;
    while !stop.load(Ordering::Acquire) {
        let frame = match source.capture_frame() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(err) => {
                failures += 1;
                WorkerStats::bump(&stats.capture_failures, 1);
                if failures >= limit {
                    return Err(WorkerError::CaptureFailures {
                        count: failures,
                        last: err,
                    });
                }
                tracing::warn!(camera = %ctx.camera_id, error = %err, failures, "frame capture failed");
                std::thread::sleep(CAPTURE_RETRY_DELAY);
                continue;
            }
        };
        let outcome = pipeline.process(&frame);
        tracing::trace!(
            camera = %ctx.camera_id,
            sequence = frame.sequence,
            faces = outcome.faces,
            matched = outcome.matched.len(),
            confirmed = outcome.confirmed.len(),
            skipped = outcome.skipped,
            "frame processed"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use roster_store::SqliteStore;

    const ALICE: u8 = 1;
    const STRANGER: u8 = 2;

    fn settings(frames_required: u32) -> WorkerSettings {
        WorkerSettings {
            threshold: 0.4,
            policy: ConfirmationPolicy {
                frames_required,
                cooldown: Duration::ZERO,
            },
            max_capture_failures: 2,
        }
    }

    fn alice_store() -> Arc<SqliteStore> {
        store_with(&[("alice", "Alice", vec![0.0, 0.0, 0.0])])
    }

    fn faces() -> TaggedExtractorFactory {
        TaggedExtractorFactory::new(&[(ALICE, vec![0.3, 0.0, 0.0]), (STRANGER, vec![0.9, 0.9, 0.9])])
    }

    struct Rig {
        store: Arc<SqliteStore>,
        cache: Arc<GalleryCache>,
        sink: Arc<CollectingSink>,
        stats: Arc<WorkerStats>,
    }

    impl Rig {
        fn new(store: Arc<SqliteStore>) -> Self {
            let cache = Arc::new(GalleryCache::new(store.clone(), None));
            cache.refresh().unwrap();
            Self {
                store,
                cache,
                sink: Arc::new(CollectingSink::default()),
                stats: Arc::new(WorkerStats::default()),
            }
        }

        fn pipeline(&self, camera_id: &str, frames_required: u32) -> FramePipeline {
            FramePipeline::new(
                camera_id,
                faces().extractor(),
                self.cache.clone(),
                AttendanceCommitter::new(self.store.clone()),
                self.sink.clone(),
                settings(frames_required),
                self.stats.clone(),
            )
        }

        fn context(&self, opener: ScriptedOpener, factory: TaggedExtractorFactory) -> WorkerContext {
            WorkerContext {
                camera_id: "cam0".into(),
                device: "/dev/video0".into(),
                opener: Arc::new(opener),
                extractors: Arc::new(factory),
                cache: self.cache.clone(),
                committer: AttendanceCommitter::new(self.store.clone()),
                events: self.sink.clone(),
                settings: settings(3),
            }
        }
    }

    fn run(pipeline: &mut FramePipeline, frames: &[Frame]) -> Vec<FrameOutcome> {
        frames.iter().map(|f| pipeline.process(f)).collect()
    }

    #[test]
    fn test_streak_broken_by_empty_frame_commits_once() {
        let rig = Rig::new(alice_store());
        let mut pipeline = rig.pipeline("cam0", 3);
        let frames: Vec<Frame> = [ALICE, ALICE, NO_FACE, ALICE, ALICE, ALICE]
            .iter()
            .enumerate()
            .map(|(i, tag)| frame(*tag, i as u32))
            .collect();

        let outcomes = run(&mut pipeline, &frames);
        let confirmed_at: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.confirmed.is_empty())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(confirmed_at, vec![5]);
        assert_eq!(outcomes[0].matched, vec!["alice".to_string()]);

        let today = PeriodKey::today();
        assert!(rig.store.has_attendance("alice", &today).unwrap());
        assert_eq!(rig.store.records_for_period(&today).unwrap().len(), 1);

        let events = rig.sink.events();
        assert_eq!(rig.sink.confirmations(), 1);
        assert!(events.contains(&RosterEvent::AttendanceCommitted {
            camera_id: "cam0".into(),
            identity_id: "alice".into(),
            period_key: today,
            outcome: CommitOutcome::Created,
        }));

        let stats = rig.stats.snapshot();
        assert_eq!(stats.frames, 6);
        assert_eq!(stats.faces, 5);
        assert_eq!(stats.commits, 1);
    }

    #[test]
    fn test_extraction_failure_keeps_streak() {
        let rig = Rig::new(alice_store());
        let mut pipeline = rig.pipeline("cam0", 3);
        let outcomes = run(
            &mut pipeline,
            &[frame(ALICE, 0), frame(ALICE, 1), frame(EXTRACT_FAIL, 2), frame(ALICE, 3)],
        );
        assert!(outcomes[2].skipped);
        assert_eq!(outcomes[3].confirmed, vec!["alice".to_string()]);
        assert_eq!(rig.stats.snapshot().extractor_failures, 1);
    }

    #[test]
    fn test_embedding_failure_keeps_streak() {
        let rig = Rig::new(alice_store());
        let mut pipeline = rig.pipeline("cam0", 3);
        let outcomes = run(
            &mut pipeline,
            &[frame(ALICE, 0), frame(ALICE, 1), frame(EMBED_FAIL, 2), frame(ALICE, 3)],
        );
        assert!(outcomes[2].skipped);
        assert_eq!(outcomes[2].faces, 1);
        assert_eq!(outcomes[3].confirmed, vec!["alice".to_string()]);
        assert_eq!(rig.stats.snapshot().extractor_failures, 1);
        assert!(rig.store.has_attendance("alice", &PeriodKey::today()).unwrap());
    }

    #[test]
    fn test_dark_frame_resets_streak() {
        let rig = Rig::new(alice_store());
        let mut pipeline = rig.pipeline("cam0", 3);
        let outcomes = run(
            &mut pipeline,
            &[frame(ALICE, 0), frame(ALICE, 1), dark_frame(2), frame(ALICE, 3), frame(ALICE, 4)],
        );
        assert!(outcomes.iter().all(|o| o.confirmed.is_empty()));
        assert_eq!(rig.stats.snapshot().dark_frames, 1);
        assert!(!rig.store.has_attendance("alice", &PeriodKey::today()).unwrap());
    }

    #[test]
    fn test_unknown_face_is_reported_not_matched() {
        let rig = Rig::new(alice_store());
        let mut pipeline = rig.pipeline("cam0", 1);
        let outcome = pipeline.process(&frame(STRANGER, 0));
        assert_eq!(outcome.faces, 1);
        assert!(outcome.matched.is_empty());
        assert!(outcome.confirmed.is_empty());
        assert_eq!(
            rig.sink.events(),
            vec![RosterEvent::FaceDetected {
                camera_id: "cam0".into(),
                faces: 1
            }]
        );
    }

    #[test]
    fn test_two_cameras_share_one_record() {
        let rig = Rig::new(alice_store());
        let mut front = rig.pipeline("front", 1);
        let mut back = rig.pipeline("back", 1);

        assert_eq!(front.process(&frame(ALICE, 0)).confirmed.len(), 1);
        assert_eq!(back.process(&frame(ALICE, 0)).confirmed.len(), 1);

        let outcomes: Vec<CommitOutcome> = rig
            .sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RosterEvent::AttendanceCommitted { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes, vec![CommitOutcome::Created, CommitOutcome::AlreadyPresent]);
        assert_eq!(rig.store.records_for_period(&PeriodKey::today()).unwrap().len(), 1);
        assert_eq!(rig.stats.snapshot().duplicates, 1);
    }

    #[test]
    fn test_refreshed_gallery_is_used_on_next_frame() {
        let rig = Rig::new(store_with(&[]));
        let mut pipeline = rig.pipeline("cam0", 1);
        assert!(pipeline.process(&frame(ALICE, 0)).matched.is_empty());

        rig.store
            .enroll_identity("alice", Some("Alice"), &roster_core::Embedding::new(vec![0.0, 0.0, 0.0]))
            .unwrap();
        rig.cache.refresh().unwrap();
        assert_eq!(pipeline.process(&frame(ALICE, 1)).matched, vec!["alice".to_string()]);
    }

    #[test]
    fn test_worker_open_failure_ends_worker() {
        let rig = Rig::new(alice_store());
        let handle = spawn_worker(rig.context(ScriptedOpener::default(), faces())).unwrap();
        let stats = handle.stats();
        assert!(matches!(
            handle.join(),
            Err(WorkerError::Camera(CameraError::DeviceNotFound(_)))
        ));
        assert_eq!(stats.state(), WorkerState::Failed);
        assert!(stats.snapshot().last_error.is_some());
    }

    #[test]
    fn test_worker_extractor_unavailable() {
        let rig = Rig::new(alice_store());
        let opener = ScriptedOpener::default()
            .with("/dev/video0", ScriptedSource::new(Vec::new(), WhenExhausted::Idle));
        let handle = spawn_worker(rig.context(opener, TaggedExtractorFactory::unavailable())).unwrap();
        assert!(matches!(handle.join(), Err(WorkerError::Extractor(_))));
    }

    #[test]
    fn test_worker_commits_then_gives_up_on_capture_failures() {
        let rig = Rig::new(alice_store());
        let frames = (0..3).map(|i| frame(ALICE, i)).collect();
        let opener = ScriptedOpener::default()
            .with("/dev/video0", ScriptedSource::new(frames, WhenExhausted::Fail));
        let handle = spawn_worker(rig.context(opener, faces())).unwrap();
        let stats = handle.stats();

        assert!(matches!(
            handle.join(),
            Err(WorkerError::CaptureFailures { count: 2, .. })
        ));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.state, WorkerState::Failed);
        assert_eq!(snapshot.frames, 3);
        assert_eq!(snapshot.capture_failures, 2);
        assert!(rig.store.has_attendance("alice", &PeriodKey::today()).unwrap());
    }

    #[test]
    fn test_worker_stops_on_request() {
        let rig = Rig::new(alice_store());
        let opener = ScriptedOpener::default()
            .with("/dev/video0", ScriptedSource::new(Vec::new(), WhenExhausted::Idle));
        let handle = spawn_worker(rig.context(opener, faces())).unwrap();
        let stats = handle.stats();

        while stats.snapshot().frames == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(stats.state(), WorkerState::Running);
        handle.request_stop();
        handle.join().unwrap();
        assert_eq!(stats.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_panicking_worker_reports_failed_before_join() {
        let rig = Rig::new(alice_store());
        let opener = ScriptedOpener::default().with(
            "/dev/video0",
            ScriptedSource::new(vec![frame(EXTRACT_PANIC, 0)], WhenExhausted::Idle),
        );
        let handle = spawn_worker(rig.context(opener, faces())).unwrap();
        let stats = handle.stats();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while stats.state() != WorkerState::Failed {
            assert!(std::time::Instant::now() < deadline, "worker never reported failure");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(
            stats.snapshot().last_error.as_deref(),
            Some("worker thread panicked")
        );
        assert!(matches!(handle.join(), Err(WorkerError::Panicked)));
    }
}
