//! facematch-hw — webcam capture for live comparisons.
//!
//! Opens a V4L2 device, skips warm-up and dark frames, and hands back a
//! single RGB still.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, PixelFormat};
pub use frame::Frame;
