//! roster-hw — Camera capture for the attendance runtime.
//!
//! Provides V4L2-based camera access behind the [`FrameSource`] trait so
//! camera workers can be driven by real devices or scripted sources.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat, V4lOpener};
pub use frame::Frame;
pub use source::{FrameSource, SourceOpener};
