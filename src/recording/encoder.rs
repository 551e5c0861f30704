//! H.264 encoder using openh264
//!
//! openh264 is synchronous, so the slot API is emulated: queued input is
//! encoded immediately and the resulting units wait in an output queue until
//! the drain loop dequeues and releases them.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver};
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

use super::codec::{
    BufferInfo, EncodedUnit, EncoderStatus, InputSlot, InputSurface, OutputSlot, TrackFormat,
    VideoCodec, VideoEncoder,
};
use super::config::StreamConfig;
use crate::convert::convert;
use crate::errors::RecordingError;
use crate::pool::DEFAULT_POOL_CAPACITY;
use crate::types::{CropRect, Frame, PixelLayout, PlaneImage};

/// Encoded units allowed to wait unreleased before input slots run out
const MAX_PENDING_OUTPUTS: usize = 8;

const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;

enum Pending {
    Format(TrackFormat),
    Unit(BufferInfo, Bytes),
}

/// H.264 encoder using openh264
pub struct H264Encoder {
    encoder: Encoder,
    config: StreamConfig,
    i420: Vec<u8>,
    pending: VecDeque<Pending>,
    outstanding: HashSet<usize>,
    next_output: usize,
    frame_count: u64,
    format_announced: bool,
    last_pts_us: i64,
    surface: Option<(InputSurface, Receiver<Frame>)>,
    stopped: bool,
}

impl H264Encoder {
    /// Create an encoder for `config`.
    ///
    /// `Encoder::new()` takes its dimensions from each YUV buffer; bitrate
    /// and frame rate are carried in the announced track format.
    pub fn new(config: &StreamConfig) -> Result<Self, RecordingError> {
        config.validate().map_err(RecordingError::Config)?;
        let encoder = Encoder::new()
            .map_err(|e| RecordingError::unavailable(format!("Failed to create encoder: {}", e)))?;

        let surface = config.uses_producer_surface.then(|| {
            let (tx, rx) = bounded(DEFAULT_POOL_CAPACITY);
            (InputSurface::new(tx), rx)
        });

        log::debug!(
            "H.264 encoder created: {}x{}, key frame every {} frames",
            config.width,
            config.height,
            config.key_frame_interval()
        );

        Ok(Self {
            encoder,
            config: config.clone(),
            i420: vec![0; PixelLayout::Planar420.frame_size(config.width, config.height)],
            pending: VecDeque::new(),
            outstanding: HashSet::new(),
            next_output: 0,
            frame_count: 0,
            format_announced: false,
            last_pts_us: 0,
            surface,
            stopped: false,
        })
    }

    /// Number of frames handed to openh264
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn ensure_running(&self) -> Result<(), RecordingError> {
        if self.stopped {
            return Err(RecordingError::invalid_state("encoder stopped"));
        }
        Ok(())
    }

    fn encode_frame(&mut self, data: &[u8], pts_us: i64) -> Result<(), RecordingError> {
        let expected = self.config.frame_size();
        if data.len() != expected {
            return Err(RecordingError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let (width, height) = (self.config.width, self.config.height);
        match self.config.layout {
            PixelLayout::Planar420 => self.i420.copy_from_slice(data),
            layout => {
                let source = PlaneImage::from_packed(layout, width, height, data);
                convert(
                    &source,
                    &CropRect::full(width, height),
                    PixelLayout::Planar420,
                    &mut self.i420,
                )?;
            }
        }

        if self.frame_count > 0 && self.frame_count % self.config.key_frame_interval() == 0 {
            self.encoder.force_intra_frame();
        }

        let yuv = YUVBuffer::from_vec(self.i420.clone(), width as usize, height as usize);
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| RecordingError::codec(format!("Encoding failed: {}", e)))?;
        self.frame_count += 1;
        self.last_pts_us = pts_us;

        let key_frame = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let encoded = bitstream.to_vec();
        if encoded.is_empty() {
            // Rate control skipped this frame
            log::trace!("Encoder produced no data for frame at {} us", pts_us);
            return Ok(());
        }

        if !self.format_announced {
            let csd = parameter_sets(&encoded);
            if csd.is_empty() {
                return Err(RecordingError::codec(
                    "first encoded frame carries no SPS/PPS",
                ));
            }
            self.format_announced = true;
            self.pending.push_back(Pending::Format(TrackFormat {
                codec: VideoCodec::H264,
                width,
                height,
                frame_rate: self.config.frame_rate as f64,
                bit_rate: self.config.bit_rate,
                csd: Bytes::from(csd.clone()),
            }));
            let info = BufferInfo {
                size: csd.len(),
                presentation_time_us: pts_us,
                codec_config: true,
                ..Default::default()
            };
            self.pending.push_back(Pending::Unit(info, Bytes::from(csd)));
        }

        let info = BufferInfo {
            size: encoded.len(),
            presentation_time_us: pts_us,
            key_frame,
            ..Default::default()
        };
        self.pending.push_back(Pending::Unit(info, Bytes::from(encoded)));
        Ok(())
    }

    fn queue_end_of_stream(&mut self, pts_us: i64) {
        self.pending
            .push_back(Pending::Unit(BufferInfo::end_of_stream(pts_us), Bytes::new()));
    }

    fn pull_surface(&mut self) -> Result<(), RecordingError> {
        let frames: Vec<Frame> = match &self.surface {
            Some((_, rx)) => rx.try_iter().collect(),
            None => return Ok(()),
        };
        for frame in frames {
            let pts = frame.pts_us.unwrap_or(self.last_pts_us);
            if let Err(e) = self.encode_frame(&frame.data, pts) {
                match e {
                    RecordingError::SizeMismatch { .. } => {
                        log::warn!("Dropping surface frame: {}", e);
                    }
                    e => return Err(e),
                }
            }
        }
        Ok(())
    }
}

impl VideoEncoder for H264Encoder {
    fn dequeue_input(&mut self, timeout: Duration) -> Result<Option<InputSlot>, RecordingError> {
        self.ensure_running()?;
        if self.outstanding.len() + self.pending.len() >= MAX_PENDING_OUTPUTS {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        Ok(Some(InputSlot(0)))
    }

    fn queue_input(
        &mut self,
        _slot: InputSlot,
        data: &[u8],
        info: BufferInfo,
    ) -> Result<(), RecordingError> {
        self.ensure_running()?;
        if info.end_of_stream {
            self.queue_end_of_stream(info.presentation_time_us);
            return Ok(());
        }
        self.encode_frame(data, info.presentation_time_us)
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderStatus, RecordingError> {
        self.ensure_running()?;
        self.pull_surface()?;
        match self.pending.pop_front() {
            Some(Pending::Format(format)) => Ok(EncoderStatus::OutputFormatChanged(format)),
            Some(Pending::Unit(info, data)) => {
                let slot = self.next_output;
                self.next_output = self.next_output.wrapping_add(1);
                self.outstanding.insert(slot);
                Ok(EncoderStatus::Output(EncodedUnit {
                    slot: OutputSlot(slot),
                    info,
                    data,
                }))
            }
            None => {
                std::thread::sleep(timeout);
                Ok(EncoderStatus::TryAgainLater)
            }
        }
    }

    fn release_output(&mut self, slot: OutputSlot) -> Result<(), RecordingError> {
        if !self.outstanding.remove(&slot.0) {
            return Err(RecordingError::protocol(format!(
                "released unknown output slot {}",
                slot.0
            )));
        }
        Ok(())
    }

    fn signal_end_of_input(&mut self) -> Result<(), RecordingError> {
        self.ensure_running()?;
        if self.surface.is_none() {
            return Err(RecordingError::invalid_state(
                "end of input signalled without an input surface",
            ));
        }
        self.pull_surface()?;
        let pts = self.last_pts_us + self.config.frame_interval_us();
        self.queue_end_of_stream(pts);
        Ok(())
    }

    fn input_surface(&self) -> Option<InputSurface> {
        self.surface.as_ref().map(|(surface, _)| surface.clone())
    }

    fn stop(&mut self) -> Result<(), RecordingError> {
        if !self.stopped {
            self.stopped = true;
            self.pending.clear();
            log::debug!("H.264 encoder stopped after {} frames", self.frame_count);
        }
        Ok(())
    }
}

/// NAL unit payloads (start codes stripped) of an Annex B stream
pub fn annex_b_units(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let mut end = match starts.get(n + 1) {
            Some(&next) => next - 3,
            None => data.len(),
        };
        // Four-byte start codes leave a zero behind
        while end > start && data[end - 1] == 0 && starts.get(n + 1).is_some() {
            end -= 1;
        }
        if end > start {
            units.push(&data[start..end]);
        }
    }
    units
}

/// SPS and PPS units of `data`, re-emitted with four-byte start codes
pub fn parameter_sets(data: &[u8]) -> Vec<u8> {
    let mut csd = Vec::new();
    for unit in annex_b_units(data) {
        let nal_type = unit[0] & 0x1f;
        if nal_type == NAL_SPS || nal_type == NAL_PPS {
            csd.extend_from_slice(&[0, 0, 0, 1]);
            csd.extend_from_slice(unit);
        }
    }
    csd
}
