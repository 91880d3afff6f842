use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Rectangular face region inside a frame, in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector score for this region, if the extractor reports one.
    #[serde(default)]
    pub score: Option<f32>,
}

/// Face embedding vector (128-dimensional for dlib-style encoders).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Callers must compare embeddings of equal dimension; extra trailing
    /// components of the longer vector are ignored.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// True if every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// An enrolled person as held in a gallery snapshot. Never mutated once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub embedding: Embedding,
}

/// One detected face in one frame, ready to be matched.
#[derive(Debug, Clone)]
pub struct Probe {
    pub camera_id: String,
    pub frame_timestamp: Instant,
    pub region: FaceRegion,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against a gallery snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched {
        identity_id: String,
        display_name: String,
        distance: f32,
        /// `1 - distance`, clamped to [0, 1].
        confidence: f32,
    },
    Unknown {
        /// Distance to the nearest identity, if the gallery had any comparable entry.
        nearest_distance: Option<f32>,
    },
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }

    pub fn identity_id(&self) -> Option<&str> {
        match self {
            MatchResult::Matched { identity_id, .. } => Some(identity_id),
            MatchResult::Unknown { .. } => None,
        }
    }

    /// Confidence of the match; always 0 for an unknown face.
    pub fn confidence(&self) -> f32 {
        match self {
            MatchResult::Matched { confidence, .. } => *confidence,
            MatchResult::Unknown { .. } => 0.0,
        }
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            MatchResult::Matched { distance, .. } => Some(*distance),
            MatchResult::Unknown { nearest_distance } => *nearest_distance,
        }
    }
}
