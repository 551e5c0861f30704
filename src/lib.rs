//! crabcorder: camera frame recording pipeline
//!
//! Takes multi-plane YUV images from a camera capture callback, repacks
//! them into an encoder-friendly layout, buffers them in a bounded frame
//! pool and drains them through a video encoder into an MP4 container.
//!
//! # Features
//! - Stride-aware 4:2:0 plane repacking with cropping (I420, NV12, NV21)
//! - Bounded frame recycling that drops the oldest frame instead of stalling capture
//! - Recording state machine with a background encoder drain thread
//! - End-of-stream flush so every queued frame reaches the container
//! - Pluggable codec backends; openh264 + muxide behind the `recording` feature
//!
//! # Usage
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! crabcorder = { version = "0.1", features = ["recording"] }
//! ```
//!
//! Then wire a capture callback to a recording stream:
//! ```rust,ignore
//! use std::sync::Arc;
//! use crabcorder::{CaptureBridge, FramePool, PixelLayout};
//! use crabcorder::recording::{H264Backend, RecordingStream, StreamConfig};
//!
//! let pool = Arc::new(FramePool::default());
//! let bridge = CaptureBridge::new(pool.clone(), PixelLayout::default());
//! let stream = RecordingStream::new(Arc::new(H264Backend::default()));
//! stream.set_data_provider(pool);
//! stream.configure(StreamConfig::new(1280, 720, 5_000_000, None, false))?;
//! stream.start()?;
//!
//! // in the camera callback:
//! bridge.on_image(&image, sensor_timestamp_ns)?;
//!
//! let stats = stream.stop()?;
//! ```
pub mod capture;
pub mod config;
pub mod convert;
pub mod errors;
pub mod invariant_ppt;
pub mod pool;
pub mod recording;
pub mod timing;
pub mod types;

// Testing utilities - synthetic images and a loopback codec backend
pub mod testing;

// Re-exports for convenience
pub use capture::CaptureBridge;
pub use config::RecorderConfig;
pub use convert::{convert, required_size};
pub use errors::{RecordingError, RecordingErrorKind};
pub use pool::{DataProvider, FramePool, FrameSink};
pub use recording::{RecordingStats, RecordingStream, StreamConfig, StreamState};
pub use timing::PtsBaseline;
pub use types::{CropRect, Frame, PixelLayout, Plane, PlaneImage, SourceFormat};

/// Initialize logging for the recording pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabcorder=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        h264_backend: cfg!(feature = "recording"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Built with the openh264/muxide backend
    pub h264_backend: bool,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "crabcorder");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert_eq!(info.h264_backend, cfg!(feature = "recording"));
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
        assert!(std::env::var("RUST_LOG").is_ok());
    }
}
