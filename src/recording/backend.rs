//! openh264 + muxide codec backend

use std::path::Path;

use super::codec::{CodecBackend, ContainerMuxer, VideoEncoder};
use super::config::StreamConfig;
use super::encoder::H264Encoder;
use super::muxer::Mp4Muxer;
use crate::errors::RecordingError;

/// Software H.264 encoding into MP4 files
#[derive(Debug, Clone, Copy, Default)]
pub struct H264Backend {
    /// Put the moov box first so players can start before the download ends
    pub fast_start: bool,
}

impl H264Backend {
    pub fn new(fast_start: bool) -> Self {
        Self { fast_start }
    }
}

impl CodecBackend for H264Backend {
    fn create_encoder(&self, config: &StreamConfig) -> Result<Box<dyn VideoEncoder>, RecordingError> {
        Ok(Box::new(H264Encoder::new(config)?))
    }

    fn create_muxer(&self, output_path: &Path) -> Result<Box<dyn ContainerMuxer>, RecordingError> {
        Ok(Box::new(Mp4Muxer::create(output_path, self.fast_start)?))
    }
}
