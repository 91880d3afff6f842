//! In-memory gallery cache with lock-free snapshot reads.
//!
//! Refresh builds a complete [`GallerySnapshot`] off to the side and
//! publishes it with a single pointer swap. Readers call
//! [`GalleryCache::snapshot`], keep the returned `Arc` for the duration of
//! one frame, and never observe a partially built gallery.

use crate::store::{GallerySource, IdentityRecord, StoreError};
use crate::types::{Embedding, Identity};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery source failed: {0}")]
    Source(#[from] StoreError),
}

/// Immutable, versioned view of the gallery at one point in time.
#[derive(Debug, Clone)]
pub struct GallerySnapshot {
    version: u64,
    loaded_at: Option<DateTime<Utc>>,
    identities: Vec<Identity>,
}

impl GallerySnapshot {
    pub fn new(version: u64, identities: Vec<Identity>) -> Self {
        Self {
            version,
            loaded_at: Some(Utc::now()),
            identities,
        }
    }

    /// The snapshot served before the first successful load. Version 0.
    pub fn empty() -> Self {
        Self {
            version: 0,
            loaded_at: None,
            identities: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Summary of a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub version: u64,
    pub loaded: usize,
    pub dropped: usize,
}

/// Periodically refreshed, thread-safe cache of the enrolled gallery.
pub struct GalleryCache {
    source: Arc<dyn GallerySource>,
    expected_dim: Option<usize>,
    current: ArcSwap<GallerySnapshot>,
    last_version: AtomicU64,
    /// Serializes writers only; readers never touch it.
    refresh_lock: Mutex<()>,
}

impl GalleryCache {
    /// Create a cache serving the empty snapshot until the first refresh.
    ///
    /// When `expected_dim` is set, records of any other dimension are dropped.
    pub fn new(source: Arc<dyn GallerySource>, expected_dim: Option<usize>) -> Self {
        Self {
            source,
            expected_dim,
            current: ArcSwap::from_pointee(GallerySnapshot::empty()),
            last_version: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The most recently published snapshot. Never blocks.
    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        self.current.load_full()
    }

    /// Reload every identity from the source and publish a new snapshot.
    ///
    /// On failure the previous snapshot stays published.
    pub fn refresh(&self) -> Result<RefreshReport, GalleryError> {
        let _writer = self
            .refresh_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let records = match self.source.list_identities() {
            Ok(records) => records,
            Err(err) => {
                let kept = self.current.load();
                tracing::warn!(
                    error = %err,
                    version = kept.version(),
                    identities = kept.len(),
                    "gallery refresh failed; keeping previous snapshot"
                );
                return Err(err.into());
            }
        };

        let total = records.len();
        let identities = validate_records(records, self.expected_dim);
        let loaded = identities.len();
        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;

        self.current
            .store(Arc::new(GallerySnapshot::new(version, identities)));

        let report = RefreshReport {
            version,
            loaded,
            dropped: total - loaded,
        };
        tracing::debug!(
            version,
            loaded,
            dropped = report.dropped,
            "gallery snapshot published"
        );
        Ok(report)
    }
}

/// Turn raw store rows into identities, dropping each malformed row with a warning.
fn validate_records(records: Vec<IdentityRecord>, expected_dim: Option<usize>) -> Vec<Identity> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut identities = Vec::with_capacity(records.len());

    for record in records {
        let id = record.id.trim().to_string();
        if id.is_empty() {
            tracing::warn!("dropping identity with empty id");
            continue;
        }
        if record.values.is_empty() || record.values.len() != record.declared_len {
            tracing::warn!(
                identity = %id,
                declared = record.declared_len,
                actual = record.values.len(),
                "dropping identity: encoding length does not match declared length"
            );
            continue;
        }
        if let Some(dim) = expected_dim {
            if record.values.len() != dim {
                tracing::warn!(
                    identity = %id,
                    expected = dim,
                    actual = record.values.len(),
                    "dropping identity: wrong embedding dimension"
                );
                continue;
            }
        }
        let embedding = Embedding::new(record.values);
        if !embedding.is_finite() {
            tracing::warn!(identity = %id, "dropping identity: non-finite embedding component");
            continue;
        }
        if !seen.insert(id.clone()) {
            tracing::warn!(identity = %id, "dropping duplicate identity id");
            continue;
        }

        let display_name = record
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| id.clone());

        identities.push(Identity {
            id,
            display_name,
            embedding,
        });
    }

    identities
}
