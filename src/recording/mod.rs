//! Video recording pipeline
//!
//! Frames flow from a [`DataProvider`](crate::pool::DataProvider) (or an
//! encoder input surface) through a [`VideoEncoder`] into a
//! [`ContainerMuxer`], driven by a drain thread that a [`RecordingStream`]
//! starts and stops.
//!
//! With the `recording` feature, [`H264Backend`] provides:
//! - openh264 for H.264 encoding
//! - muxide for MP4 muxing
//!
//! # Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use crabcorder::pool::FramePool;
//! use crabcorder::recording::{H264Backend, RecordingStream, StreamConfig};
//!
//! let pool = Arc::new(FramePool::default());
//! let stream = RecordingStream::new(Arc::new(H264Backend::default()));
//! stream.set_data_provider(pool.clone());
//! stream.configure(StreamConfig::new(1280, 720, 5_000_000, None, false))?;
//! stream.start()?;
//!
//! // Camera callback publishes frames into `pool`...
//!
//! let stats = stream.stop()?;
//! ```

mod codec;
mod config;
mod drain;
mod session;
mod stream;

#[cfg(feature = "recording")]
mod backend;
#[cfg(feature = "recording")]
mod encoder;
#[cfg(feature = "recording")]
mod muxer;

pub use codec::{
    BufferInfo, CodecBackend, ContainerMuxer, EncodedUnit, EncoderStatus, InputSlot, InputSurface,
    OutputSlot, TrackFormat, TrackIndex, VideoCodec, VideoEncoder,
};
pub use config::{
    RecordingQuality, RecordingStats, StreamConfig, DEFAULT_FRAME_RATE,
    DEFAULT_I_FRAME_INTERVAL_SECS,
};
pub use drain::{DEQUEUE_TIMEOUT, EOS_DRAIN_TIMEOUT};
pub use session::{resolve_output_path, EncodeSession};
pub use stream::{RecordingStream, StreamState};

#[cfg(feature = "recording")]
pub use backend::H264Backend;
#[cfg(feature = "recording")]
pub use encoder::{annex_b_units, parameter_sets, H264Encoder};
#[cfg(feature = "recording")]
pub use muxer::Mp4Muxer;
