//! Face extraction through a sidecar process speaking JSON lines.
//!
//! Per frame the daemon writes one header line `{"width":W,"height":H,"len":N}`
//! followed by `N` raw grayscale bytes. The sidecar answers with one line:
//! `{"faces":[{"region":{...},"embedding":[...]|null}]}` or `{"error":"..."}`.

use roster_core::{Embedding, EmbeddingExtractor, ExtractError, FaceRegion};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Creates one extractor per camera worker.
pub trait ExtractorFactory: Send + Sync {
    fn create(&self, camera_id: &str) -> Result<Box<dyn EmbeddingExtractor>, ExtractError>;
}

#[derive(Serialize)]
struct FrameHeader {
    width: u32,
    height: u32,
    len: usize,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    faces: Vec<ReplyFace>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ReplyFace {
    region: FaceRegion,
    #[serde(default)]
    embedding: Option<Embedding>,
}

/// JSON-lines extractor over any writer/reader pair.
///
/// `detect_faces` performs the round trip and keeps the returned
/// embeddings; `embed` answers from that cache for the same frame.
pub struct JsonLinesExtractor<W, R> {
    writer: W,
    reader: R,
    line: String,
    last: Vec<ReplyFace>,
}

impl<W: Write, R: BufRead> JsonLinesExtractor<W, R> {
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            reader,
            line: String::new(),
            last: Vec::new(),
        }
    }

    fn round_trip(&mut self, frame: &[u8], width: u32, height: u32) -> Result<Reply, ExtractError> {
        let header = FrameHeader {
            width,
            height,
            len: frame.len(),
        };
        let mut encoded = serde_json::to_vec(&header).map_err(|e| ExtractError::Failed(e.to_string()))?;
        encoded.push(b'\n');

        self.writer
            .write_all(&encoded)
            .and_then(|_| self.writer.write_all(frame))
            .and_then(|_| self.writer.flush())
            .map_err(|e| ExtractError::Unavailable(format!("write to extractor failed: {e}")))?;

        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| ExtractError::Unavailable(format!("read from extractor failed: {e}")))?;
        if read == 0 {
            return Err(ExtractError::Unavailable("extractor closed its output".into()));
        }

        let reply: Reply = serde_json::from_str(self.line.trim_end())
            .map_err(|e| ExtractError::Failed(format!("malformed extractor reply: {e}")))?;
        match reply.error {
            Some(message) => Err(ExtractError::Failed(message)),
            None => Ok(reply),
        }
    }
}

impl<W, R> EmbeddingExtractor for JsonLinesExtractor<W, R>
where
    W: Write + Send,
    R: BufRead + Send,
{
    fn detect_faces(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, ExtractError> {
        self.last.clear();
        let reply = self.round_trip(frame, width, height)?;
        self.last = reply.faces;
        Ok(self.last.iter().map(|face| face.region.clone()).collect())
    }

    fn embed(
        &mut self,
        _frame: &[u8],
        _width: u32,
        _height: u32,
        region: &FaceRegion,
    ) -> Result<Option<Embedding>, ExtractError> {
        Ok(self
            .last
            .iter()
            .find(|face| &face.region == region)
            .and_then(|face| face.embedding.clone()))
    }
}

/// A spawned sidecar. The child is killed when the extractor is dropped.
pub struct ProcessExtractor {
    child: Child,
    inner: JsonLinesExtractor<ChildStdin, BufReader<ChildStdout>>,
}

impl ProcessExtractor {
    pub fn spawn(command: &[String], camera_id: &str) -> Result<Self, ExtractError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ExtractError::Unavailable("extractor command is empty".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .env("ROSTER_CAMERA_ID", camera_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ExtractError::Unavailable(format!("failed to start {program}: {e}")))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(ExtractError::Unavailable("extractor pipes unavailable".into()));
        };

        tracing::info!(camera = camera_id, program = %program, pid = child.id(), "extractor started");
        Ok(Self {
            child,
            inner: JsonLinesExtractor::new(stdin, BufReader::new(stdout)),
        })
    }
}

impl EmbeddingExtractor for ProcessExtractor {
    fn detect_faces(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, ExtractError> {
        self.inner.detect_faces(frame, width, height)
    }

    fn embed(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<Option<Embedding>, ExtractError> {
        self.inner.embed(frame, width, height, region)
    }
}

impl Drop for ProcessExtractor {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Spawns a [`ProcessExtractor`] per camera from a fixed command line.
pub struct ProcessExtractorFactory {
    command: Vec<String>,
}

impl ProcessExtractorFactory {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl ExtractorFactory for ProcessExtractorFactory {
    fn create(&self, camera_id: &str) -> Result<Box<dyn EmbeddingExtractor>, ExtractError> {
        Ok(Box::new(ProcessExtractor::spawn(&self.command, camera_id)?))
    }
}
