//! roster-core — Recognition-and-confirmation core for camera attendance.
//!
//! Matches probe embeddings against a lock-free gallery snapshot,
//! debounces matches per camera and commits attendance at most once per
//! identity and period.

pub mod attendance;
pub mod events;
pub mod extractor;
pub mod gallery;
pub mod matcher;
pub mod store;
pub mod tracker;
pub mod types;

pub use attendance::{AttendanceCommitter, AttendanceRecord, PeriodKey};
pub use events::{EventSink, RosterEvent};
pub use extractor::{EmbeddingExtractor, ExtractError};
pub use gallery::{GalleryCache, GalleryError, GallerySnapshot, RefreshReport};
pub use matcher::{threshold_from_confidence, EuclideanMatcher, Matcher};
pub use store::{AttendanceStore, CommitOutcome, GallerySource, IdentityRecord, StoreError};
pub use tracker::{Confirmation, ConfirmationPolicy, ConfirmationTracker, FrameMatch, Phase};
pub use types::{Embedding, FaceRegion, Identity, MatchResult, Probe};
