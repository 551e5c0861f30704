//! MP4 muxer using muxide

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use muxide::api::{Metadata, Muxer, MuxerBuilder, VideoCodec as MuxideCodec};

use super::codec::{BufferInfo, ContainerMuxer, TrackFormat, TrackIndex, VideoCodec};
use crate::errors::RecordingError;

/// Single-track MP4 writer.
///
/// The file is created up front; the muxide muxer is built when the
/// encoder announces its format, since that is when dimensions are known.
pub struct Mp4Muxer {
    output_path: PathBuf,
    fast_start: bool,
    writer: Option<BufWriter<File>>,
    muxer: Option<Muxer<BufWriter<File>>>,
    track: Option<TrackIndex>,
    started: bool,
    first_pts_us: Option<i64>,
    finished: bool,
}

impl Mp4Muxer {
    pub fn create(output_path: &Path, fast_start: bool) -> Result<Self, RecordingError> {
        let file = File::create(output_path).map_err(|e| {
            RecordingError::unavailable(format!(
                "Failed to create output file {}: {}",
                output_path.display(),
                e
            ))
        })?;

        Ok(Self {
            output_path: output_path.to_path_buf(),
            fast_start,
            writer: Some(BufWriter::new(file)),
            muxer: None,
            track: None,
            started: false,
            first_pts_us: None,
            finished: false,
        })
    }
}

impl ContainerMuxer for Mp4Muxer {
    fn add_track(&mut self, format: &TrackFormat) -> Result<TrackIndex, RecordingError> {
        if self.track.is_some() {
            return Err(RecordingError::protocol("MP4 muxer already has a video track"));
        }
        let writer = self
            .writer
            .take()
            .ok_or_else(|| RecordingError::invalid_state("muxer already finished"))?;

        let codec = match format.codec {
            VideoCodec::H264 => MuxideCodec::H264,
        };
        let muxer = MuxerBuilder::new(writer)
            .video(codec, format.width, format.height, format.frame_rate)
            .with_fast_start(self.fast_start)
            .with_metadata(Metadata::new().with_current_time())
            .build()
            .map_err(|e| RecordingError::codec(format!("Failed to create muxer: {}", e)))?;

        self.muxer = Some(muxer);
        let track = TrackIndex(0);
        self.track = Some(track);
        Ok(track)
    }

    fn start(&mut self) -> Result<(), RecordingError> {
        if self.muxer.is_none() {
            return Err(RecordingError::protocol("muxer started without a track"));
        }
        self.started = true;
        Ok(())
    }

    fn write_sample(
        &mut self,
        track: TrackIndex,
        data: &[u8],
        info: &BufferInfo,
    ) -> Result<(), RecordingError> {
        if self.track != Some(track) {
            return Err(RecordingError::protocol(format!("unknown track {:?}", track)));
        }
        let muxer = match (self.started, self.muxer.as_mut()) {
            (true, Some(muxer)) => muxer,
            _ => return Err(RecordingError::protocol("muxer hasn't started")),
        };

        // The container timeline starts at the first sample
        let first = *self.first_pts_us.get_or_insert(info.presentation_time_us);
        let pts_secs = (info.presentation_time_us - first).max(0) as f64 / 1_000_000.0;

        muxer
            .write_video(pts_secs, data, info.key_frame)
            .map_err(|e| RecordingError::codec(format!("Failed to write frame: {}", e)))
    }

    fn stop(&mut self) -> Result<(), RecordingError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        match self.muxer.take() {
            Some(muxer) => {
                let stats = muxer.finish_with_stats().map_err(|e| {
                    RecordingError::codec(format!("Failed to finalize recording: {}", e))
                })?;
                log::info!(
                    "Recording finalized: {} video frames, {:.2}s, {} bytes -> {}",
                    stats.video_frames,
                    stats.duration_secs,
                    stats.bytes_written,
                    self.output_path.display()
                );
            }
            None => {
                self.writer.take();
                log::warn!(
                    "No video track was added, {} left empty",
                    self.output_path.display()
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    fn format() -> TrackFormat {
        TrackFormat {
            codec: VideoCodec::H264,
            width: 176,
            height: 144,
            frame_rate: 30.0,
            bit_rate: 500_000,
            csd: Bytes::new(),
        }
    }

    #[test]
    fn test_sample_before_start_is_rejected() {
        let dir = tempdir().unwrap();
        let mut muxer = Mp4Muxer::create(&dir.path().join("a.mp4"), false).unwrap();
        let track = muxer.add_track(&format()).unwrap();

        let err = muxer
            .write_sample(track, &[0, 0, 0, 1, 0x65], &BufferInfo::sample(5, 0))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_second_track_is_rejected() {
        let dir = tempdir().unwrap();
        let mut muxer = Mp4Muxer::create(&dir.path().join("b.mp4"), false).unwrap();
        muxer.add_track(&format()).unwrap();
        assert!(muxer.add_track(&format()).is_err());
    }

    #[test]
    fn test_stop_without_track_is_harmless() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        let mut muxer = Mp4Muxer::create(&path, false).unwrap();
        muxer.stop().unwrap();
        muxer.stop().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_path_is_unavailable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("c.mp4");
        let err = Mp4Muxer::create(&path, false).err().unwrap();
        assert!(matches!(err, RecordingError::ResourceUnavailable(_)));
    }
}
