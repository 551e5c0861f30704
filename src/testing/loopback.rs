//! In-memory encoder/muxer backend
//!
//! Behaves like a well-mannered hardware codec without compressing
//! anything: every input frame comes back as one output unit with the same
//! timestamp, preceded once by a format change and a codec-config unit.
//! The muxer appends sample bytes to the output file. Everything the pair
//! does is recorded in a shared [`LoopbackLog`] for assertions.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver};

use crate::errors::RecordingError;
use crate::recording::{
    BufferInfo, CodecBackend, ContainerMuxer, EncodedUnit, EncoderStatus, InputSlot,
    InputSurface, OutputSlot, StreamConfig, TrackFormat, TrackIndex, VideoCodec, VideoEncoder,
};
use crate::types::Frame;

/// Fake SPS + PPS announced as codec-specific data
const LOOPBACK_CSD: [u8; 12] = [0, 0, 0, 1, 0x67, 0x42, 0, 0x1e, 0, 0, 0, 1];

/// Output injected ahead of anything the encoder produces itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutput {
    FormatChanged,
    Data { pts_us: i64, size: usize },
    EndOfStream { pts_us: i64 },
}

/// Something the muxer was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum MuxerEvent {
    TrackAdded(TrackFormat),
    Started,
    Sample {
        track: TrackIndex,
        pts_us: i64,
        size: usize,
        key_frame: bool,
    },
    Stopped,
}

#[derive(Debug, Default)]
struct LogInner {
    encoders_created: usize,
    muxers_created: usize,
    encoder_stops: usize,
    muxer_stops: usize,
    emitted_outputs: usize,
    released_outputs: usize,
    eos_input_pts: Option<i64>,
    muxer_events: Vec<MuxerEvent>,
}

/// Shared record of everything a [`LoopbackBackend`] did
#[derive(Debug, Clone, Default)]
pub struct LoopbackLog {
    inner: Arc<Mutex<LogInner>>,
}

impl LoopbackLog {
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn encoder_stops(&self) -> usize {
        self.lock().encoder_stops
    }

    pub fn muxer_stops(&self) -> usize {
        self.lock().muxer_stops
    }

    /// Output units handed out by encoders (format changes excluded)
    pub fn emitted_outputs(&self) -> usize {
        self.lock().emitted_outputs
    }

    pub fn released_outputs(&self) -> usize {
        self.lock().released_outputs
    }

    /// Timestamp of the end-of-stream input, if one was queued
    pub fn eos_input_pts(&self) -> Option<i64> {
        self.lock().eos_input_pts
    }

    pub fn muxer_events(&self) -> Vec<MuxerEvent> {
        self.lock().muxer_events.clone()
    }

    pub fn format_changes(&self) -> usize {
        self.lock()
            .muxer_events
            .iter()
            .filter(|e| matches!(e, MuxerEvent::TrackAdded(_)))
            .count()
    }

    /// `(pts_us, size)` of every sample written
    pub fn samples(&self) -> Vec<(i64, usize)> {
        self.lock()
            .muxer_events
            .iter()
            .filter_map(|e| match e {
                MuxerEvent::Sample { pts_us, size, .. } => Some((*pts_us, *size)),
                _ => None,
            })
            .collect()
    }
}

/// [`CodecBackend`] producing loopback encoders and file-appending muxers
#[derive(Debug, Clone)]
pub struct LoopbackBackend {
    log: LoopbackLog,
    script: Vec<ScriptedOutput>,
    input_slots: usize,
    honor_end_of_stream: bool,
    fail_encoder: bool,
    fail_muxer: bool,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self {
            log: LoopbackLog::default(),
            script: Vec::new(),
            input_slots: 4,
            honor_end_of_stream: true,
            fail_encoder: false,
            fail_muxer: false,
        }
    }

    pub fn with_script(mut self, script: Vec<ScriptedOutput>) -> Self {
        self.script = script;
        self
    }

    /// Number of input slots; zero makes every input dequeue time out
    pub fn with_input_slots(mut self, slots: usize) -> Self {
        self.input_slots = slots;
        self
    }

    /// Swallow end-of-stream inputs instead of echoing them
    pub fn ignoring_end_of_stream(mut self) -> Self {
        self.honor_end_of_stream = false;
        self
    }

    pub fn failing_encoder(mut self) -> Self {
        self.fail_encoder = true;
        self
    }

    pub fn failing_muxer(mut self) -> Self {
        self.fail_muxer = true;
        self
    }

    pub fn log(&self) -> LoopbackLog {
        self.log.clone()
    }

    pub fn encoders_created(&self) -> usize {
        self.log.lock().encoders_created
    }

    pub fn muxers_created(&self) -> usize {
        self.log.lock().muxers_created
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecBackend for LoopbackBackend {
    fn create_encoder(&self, config: &StreamConfig) -> Result<Box<dyn VideoEncoder>, RecordingError> {
        if self.fail_encoder {
            return Err(RecordingError::unavailable("loopback encoder disabled"));
        }
        self.log.lock().encoders_created += 1;
        Ok(Box::new(LoopbackEncoder::new(self, config)))
    }

    fn create_muxer(&self, output_path: &Path) -> Result<Box<dyn ContainerMuxer>, RecordingError> {
        if self.fail_muxer {
            return Err(RecordingError::unavailable("loopback muxer disabled"));
        }
        let file = File::create(output_path).map_err(|e| {
            RecordingError::unavailable(format!(
                "Failed to create {}: {}",
                output_path.display(),
                e
            ))
        })?;
        self.log.lock().muxers_created += 1;
        Ok(Box::new(LoopbackMuxer {
            log: self.log.clone(),
            writer: Some(BufWriter::new(file)),
            track: None,
            started: false,
        }))
    }
}

enum Pending {
    Format,
    Unit(BufferInfo, Bytes),
}

pub struct LoopbackEncoder {
    log: LoopbackLog,
    format: TrackFormat,
    input_slots: usize,
    honor_end_of_stream: bool,
    pending: VecDeque<Pending>,
    format_announced: bool,
    next_output: usize,
    outstanding: HashSet<usize>,
    surface: Option<(InputSurface, Receiver<Frame>)>,
    stopped: bool,
}

impl LoopbackEncoder {
    fn new(backend: &LoopbackBackend, config: &StreamConfig) -> Self {
        let mut pending = VecDeque::new();
        for item in &backend.script {
            pending.push_back(match item {
                ScriptedOutput::FormatChanged => Pending::Format,
                ScriptedOutput::Data { pts_us, size } => Pending::Unit(
                    BufferInfo::sample(*size, *pts_us),
                    Bytes::from(vec![0xAB; *size]),
                ),
                ScriptedOutput::EndOfStream { pts_us } => {
                    Pending::Unit(BufferInfo::end_of_stream(*pts_us), Bytes::new())
                }
            });
        }

        let surface = config.uses_producer_surface.then(|| {
            let (tx, rx) = bounded(crate::pool::DEFAULT_POOL_CAPACITY);
            (InputSurface::new(tx), rx)
        });

        Self {
            log: backend.log.clone(),
            format: TrackFormat {
                codec: VideoCodec::H264,
                width: config.width,
                height: config.height,
                frame_rate: config.frame_rate as f64,
                bit_rate: config.bit_rate,
                csd: Bytes::from_static(&LOOPBACK_CSD),
            },
            input_slots: backend.input_slots,
            honor_end_of_stream: backend.honor_end_of_stream,
            pending,
            format_announced: !backend.script.is_empty(),
            next_output: 0,
            outstanding: HashSet::new(),
            surface,
            stopped: false,
        }
    }

    fn encode(&mut self, data: &[u8], info: BufferInfo) {
        if info.end_of_stream {
            self.log.lock().eos_input_pts = Some(info.presentation_time_us);
            if self.honor_end_of_stream {
                self.pending.push_back(Pending::Unit(info, Bytes::new()));
            }
            return;
        }

        let key_frame = !self.format_announced;
        if !self.format_announced {
            self.format_announced = true;
            self.pending.push_back(Pending::Format);
            let csd = BufferInfo {
                size: LOOPBACK_CSD.len(),
                presentation_time_us: info.presentation_time_us,
                codec_config: true,
                ..Default::default()
            };
            self.pending
                .push_back(Pending::Unit(csd, Bytes::from_static(&LOOPBACK_CSD)));
        }

        let out = BufferInfo {
            size: data.len(),
            presentation_time_us: info.presentation_time_us,
            key_frame,
            ..Default::default()
        };
        self.pending
            .push_back(Pending::Unit(out, Bytes::copy_from_slice(data)));
    }

    fn pull_surface(&mut self) {
        let frames: Vec<Frame> = match &self.surface {
            Some((_, rx)) => rx.try_iter().collect(),
            None => return,
        };
        for frame in frames {
            let pts = frame.pts_us.unwrap_or(0);
            self.encode(&frame.data, BufferInfo::sample(frame.len(), pts));
        }
    }
}

impl VideoEncoder for LoopbackEncoder {
    fn dequeue_input(&mut self, timeout: Duration) -> Result<Option<InputSlot>, RecordingError> {
        if self.stopped {
            return Err(RecordingError::invalid_state("encoder stopped"));
        }
        if self.input_slots == 0 {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        Ok(Some(InputSlot(0)))
    }

    fn queue_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        info: BufferInfo,
    ) -> Result<(), RecordingError> {
        if slot.0 >= self.input_slots {
            return Err(RecordingError::protocol(format!("unknown input slot {}", slot.0)));
        }
        self.encode(data, info);
        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderStatus, RecordingError> {
        self.pull_surface();
        match self.pending.pop_front() {
            Some(Pending::Format) => Ok(EncoderStatus::OutputFormatChanged(self.format.clone())),
            Some(Pending::Unit(info, data)) => {
                let slot = self.next_output;
                self.next_output += 1;
                self.outstanding.insert(slot);
                self.log.lock().emitted_outputs += 1;
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
        self.log.lock().released_outputs += 1;
        Ok(())
    }

    fn signal_end_of_input(&mut self) -> Result<(), RecordingError> {
        if self.surface.is_none() {
            return Err(RecordingError::invalid_state(
                "end of input signalled without an input surface",
            ));
        }
        self.pull_surface();
        self.encode(&[], BufferInfo::end_of_stream(0));
        Ok(())
    }

    fn input_surface(&self) -> Option<InputSurface> {
        self.surface.as_ref().map(|(surface, _)| surface.clone())
    }

    fn stop(&mut self) -> Result<(), RecordingError> {
        if !self.stopped {
            self.stopped = true;
            self.log.lock().encoder_stops += 1;
        }
        Ok(())
    }
}

pub struct LoopbackMuxer {
    log: LoopbackLog,
    writer: Option<BufWriter<File>>,
    track: Option<TrackIndex>,
    started: bool,
}

impl ContainerMuxer for LoopbackMuxer {
    fn add_track(&mut self, format: &TrackFormat) -> Result<TrackIndex, RecordingError> {
        if self.started || self.track.is_some() {
            return Err(RecordingError::protocol("loopback muxer holds a single track"));
        }
        let track = TrackIndex(0);
        self.track = Some(track);
        self.log
            .lock()
            .muxer_events
            .push(MuxerEvent::TrackAdded(format.clone()));
        Ok(track)
    }

    fn start(&mut self) -> Result<(), RecordingError> {
        if self.track.is_none() {
            return Err(RecordingError::protocol("muxer started without a track"));
        }
        self.started = true;
        self.log.lock().muxer_events.push(MuxerEvent::Started);
        Ok(())
    }

    fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &BufferInfo,
    ) -> Result<(), RecordingError> {
        if !self.started || self.track != Some(track) {
            return Err(RecordingError::protocol("sample written to a stopped muxer"));
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(data)?;
        }
        self.log.lock().muxer_events.push(MuxerEvent::Sample {
            track,
            pts_us: info.presentation_time_us,
            size: data.len(),
            key_frame: info.key_frame,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecordingError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        let mut log = self.log.lock();
        log.muxer_stops += 1;
        log.muxer_events.push(MuxerEvent::Stopped);
        Ok(())
    }
}
