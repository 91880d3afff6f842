//! Boundary with the external face detector / embedding extractor.

use crate::types::{Embedding, FaceRegion};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extractor unavailable: {0}")]
    Unavailable(String),
    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Detects faces in a grayscale frame and turns each into an embedding.
///
/// Implementations may be stateful (one instance per camera worker) and
/// are called synchronously from the worker thread.
pub trait EmbeddingExtractor: Send {
    /// Face regions in the frame. An empty vector means no face, not an error.
    fn detect_faces(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, ExtractError>;

    /// Embedding for one detected region, or `None` if the region could not be encoded.
    fn embed(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<Option<Embedding>, ExtractError>;
}
