//! Encoder and muxer abstractions
//!
//! The drain loop talks to encoders through a slot-based API modelled on
//! hardware codecs: input slots are dequeued with a bounded wait, filled and
//! queued; output units are dequeued with a bounded wait and released once
//! forwarded. Muxers get a track once the encoder announces its output
//! format, and only then may receive samples.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Sender, TrySendError};

use super::config::StreamConfig;
use crate::errors::RecordingError;
use crate::pool::FrameSink;
use crate::types::Frame;

/// Handle for an encoder input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputSlot(pub usize);

/// Handle for an encoder output slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSlot(pub usize);

/// Index of a track registered with a muxer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackIndex(pub usize);

/// Metadata attached to every encoder input and output unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    pub size: usize,
    pub presentation_time_us: i64,
    pub key_frame: bool,
    /// Codec-specific data (SPS/PPS) rather than picture data
    pub codec_config: bool,
    pub end_of_stream: bool,
}

impl BufferInfo {
    pub fn sample(size: usize, presentation_time_us: i64) -> Self {
        Self {
            size,
            presentation_time_us,
            ..Default::default()
        }
    }

    pub fn end_of_stream(presentation_time_us: i64) -> Self {
        Self {
            presentation_time_us,
            end_of_stream: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
}

/// Output format announced by an encoder before its first data unit
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFormat {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub bit_rate: u32,
    /// Codec-specific data, e.g. Annex B SPS and PPS
    pub csd: Bytes,
}

/// One compressed unit waiting in an encoder output slot
#[derive(Debug, Clone)]
pub struct EncodedUnit {
    pub slot: OutputSlot,
    pub info: BufferInfo,
    pub data: Bytes,
}

/// Result of polling an encoder for output
#[derive(Debug, Clone)]
pub enum EncoderStatus {
    /// Nothing ready within the wait
    TryAgainLater,
    /// The output format is now known; happens once, before any data
    OutputFormatChanged(TrackFormat),
    Output(EncodedUnit),
}

pub trait VideoEncoder: Send {
    /// Wait up to `timeout` for a free input slot
    fn dequeue_input(&mut self, timeout: Duration) -> Result<Option<InputSlot>, RecordingError>;

    /// Copy `data` into `slot` and submit it. The encoder must not keep a
    /// reference to `data` after returning.
    fn queue_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        info: BufferInfo,
    ) -> Result<(), RecordingError>;

    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderStatus, RecordingError>;

    fn release_output(&mut self, slot: OutputSlot) -> Result<(), RecordingError>;

    /// End of stream for producer-surface input
    fn signal_end_of_input(&mut self) -> Result<(), RecordingError>;

    /// Producer-surface handle, if the encoder was configured for one
    fn input_surface(&self) -> Option<InputSurface>;

    fn stop(&mut self) -> Result<(), RecordingError>;
}

pub trait ContainerMuxer: Send {
    fn add_track(&mut self, format: &TrackFormat) -> Result<TrackIndex, RecordingError>;

    fn start(&mut self) -> Result<(), RecordingError>;

    fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &BufferInfo,
    ) -> Result<(), RecordingError>;

    /// Finalize the container. Called once; later calls are no-ops.
    fn stop(&mut self) -> Result<(), RecordingError>;
}

/// Creates encoder/muxer pairs for a stream configuration
pub trait CodecBackend: Send + Sync {
    fn create_encoder(&self, config: &StreamConfig) -> Result<Box<dyn VideoEncoder>, RecordingError>;

    fn create_muxer(&self, output_path: &Path) -> Result<Box<dyn ContainerMuxer>, RecordingError>;
}

/// Non-blocking producer handle feeding frames straight into an encoder.
///
/// Frames that do not fit are dropped and counted.
#[derive(Debug, Clone)]
pub struct InputSurface {
    tx: Sender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl InputSurface {
    pub fn new(tx: Sender<Frame>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Offer a frame; returns false if it was dropped
    pub fn submit(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for InputSurface {
    fn acquire(&self, required_size: usize) -> Frame {
        Frame::with_size(required_size)
    }

    fn publish(&self, frame: Frame) {
        if !self.submit(frame) {
            log::debug!("Input surface full, frame dropped");
        }
    }
}
