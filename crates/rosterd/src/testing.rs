//! Scripted cameras, extractors and sinks for worker and supervisor tests.
//!
//! Frames carry a tag in their first byte: [`NO_FACE`], [`EXTRACT_FAIL`],
//! [`EMBED_FAIL`], [`EXTRACT_PANIC`], or the key of a face in the
//! extractor's table.

use crate::extractor::ExtractorFactory;
use roster_core::{
    Embedding, EmbeddingExtractor, EventSink, ExtractError, FaceRegion, RosterEvent,
};
use roster_hw::{CameraError, Frame, FrameSource, SourceOpener};
use roster_store::SqliteStore;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const NO_FACE: u8 = 0;
pub const EXTRACT_FAIL: u8 = 255;
/// A face is found but its embedding fails.
pub const EMBED_FAIL: u8 = 254;
pub const EXTRACT_PANIC: u8 = 253;

pub fn frame(tag: u8, sequence: u32) -> Frame {
    let mut data = vec![128u8; 16];
    data[0] = tag;
    Frame {
        data,
        width: 4,
        height: 4,
        timestamp: Instant::now(),
        sequence,
        is_dark: false,
    }
}

pub fn dark_frame(sequence: u32) -> Frame {
    Frame {
        is_dark: true,
        ..frame(NO_FACE, sequence)
    }
}

/// Extractor that reports one face per tagged frame.
pub struct TaggedExtractor {
    faces: HashMap<u8, Embedding>,
}

impl EmbeddingExtractor for TaggedExtractor {
    fn detect_faces(&mut self, frame: &[u8], _: u32, _: u32) -> Result<Vec<FaceRegion>, ExtractError> {
        match frame.first().copied().unwrap_or(NO_FACE) {
            NO_FACE => Ok(Vec::new()),
            EXTRACT_FAIL => Err(ExtractError::Failed("scripted failure".into())),
            EXTRACT_PANIC => panic!("scripted extractor panic"),
            tag => Ok(vec![FaceRegion {
                x: f32::from(tag),
                y: 0.0,
                width: 2.0,
                height: 2.0,
                score: Some(0.99),
            }]),
        }
    }

    fn embed(
        &mut self,
        _: &[u8],
        _: u32,
        _: u32,
        region: &FaceRegion,
    ) -> Result<Option<Embedding>, ExtractError> {
        match region.x as u8 {
            EMBED_FAIL => Err(ExtractError::Failed("scripted embedding failure".into())),
            tag => Ok(self.faces.get(&tag).cloned()),
        }
    }
}

pub struct TaggedExtractorFactory {
    faces: HashMap<u8, Embedding>,
    unavailable: bool,
}

impl TaggedExtractorFactory {
    pub fn new(faces: &[(u8, Vec<f32>)]) -> Self {
        Self {
            faces: faces
                .iter()
                .map(|(tag, values)| (*tag, Embedding::new(values.clone())))
                .collect(),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            faces: HashMap::new(),
            unavailable: true,
        }
    }

    pub fn extractor(&self) -> Box<dyn EmbeddingExtractor> {
        Box::new(TaggedExtractor {
            faces: self.faces.clone(),
        })
    }
}

impl ExtractorFactory for TaggedExtractorFactory {
    fn create(&self, _camera_id: &str) -> Result<Box<dyn EmbeddingExtractor>, ExtractError> {
        if self.unavailable {
            return Err(ExtractError::Unavailable("no sidecar".into()));
        }
        Ok(self.extractor())
    }
}

/// What a [`ScriptedSource`] does once its frames run out.
#[derive(Debug, Clone, Copy)]
pub enum WhenExhausted {
    Fail,
    Idle,
}

pub struct ScriptedSource {
    frames: VecDeque<Frame>,
    when_exhausted: WhenExhausted,
    sequence: u32,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Frame>, when_exhausted: WhenExhausted) -> Self {
        Self {
            frames: frames.into(),
            when_exhausted,
            sequence: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        self.sequence += 1;
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        match self.when_exhausted {
            WhenExhausted::Fail => Err(CameraError::CaptureFailed("script exhausted".into())),
            WhenExhausted::Idle => {
                std::thread::sleep(Duration::from_millis(2));
                Ok(frame(NO_FACE, self.sequence))
            }
        }
    }

    fn describe(&self) -> String {
        format!("scripted ({} frames left)", self.frames.len())
    }
}

/// Hands out one scripted source per device path; unknown devices fail to open.
#[derive(Default)]
pub struct ScriptedOpener {
    sources: Mutex<HashMap<String, ScriptedSource>>,
}

impl ScriptedOpener {
    pub fn with(self, device: &str, source: ScriptedSource) -> Self {
        self.sources
            .lock()
            .unwrap()
            .insert(device.to_string(), source);
        self
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(&self, device: &str) -> Result<Box<dyn FrameSource>, CameraError> {
        match self.sources.lock().unwrap().remove(device) {
            Some(source) => Ok(Box::new(source)),
            None => Err(CameraError::DeviceNotFound(device.to_string())),
        }
    }
}

#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<RosterEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<RosterEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn confirmations(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, RosterEvent::IdentityConfirmed { .. }))
            .count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: RosterEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory store with the given identities enrolled.
pub fn store_with(identities: &[(&str, &str, Vec<f32>)]) -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    for (id, name, values) in identities {
        store
            .enroll_identity(id, Some(name), &Embedding::new(values.clone()))
            .unwrap();
    }
    Arc::new(store)
}
