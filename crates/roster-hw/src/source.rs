use crate::camera::CameraError;
use crate::frame::Frame;

/// Anything a camera worker can pull frames from.
///
/// Owned by exactly one worker thread; dropping it releases the device.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    fn capture_frame(&mut self) -> Result<Frame, CameraError>;

    /// Human-readable device description for logs.
    fn describe(&self) -> String;
}

/// Opens frame sources by device path. One call per camera worker.
pub trait SourceOpener: Send + Sync {
    fn open(&self, device: &str) -> Result<Box<dyn FrameSource>, CameraError>;
}
