//! Encoder + muxer ownership for one configured stream

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use super::codec::{CodecBackend, ContainerMuxer, InputSurface, TrackIndex, VideoEncoder};
use super::config::{RecordingStats, StreamConfig};
use crate::errors::RecordingError;

/// Owns the encoder and muxer handles built for a [`StreamConfig`].
///
/// Exactly one party holds the session at a time: the stream while
/// configured, the drain thread while recording, then the stream again for
/// the final drain and release.
pub struct EncodeSession {
    pub(super) encoder: Box<dyn VideoEncoder>,
    pub(super) muxer: Box<dyn ContainerMuxer>,
    pub(super) config: StreamConfig,
    pub(super) output_path: PathBuf,
    pub(super) track: Option<TrackIndex>,
    pub(super) muxer_started: bool,
    pub(super) last_input_pts_us: i64,
    pub(super) eos_queued: bool,
    pub(super) output_eos_seen: bool,
    pub(super) stats: RecordingStats,
    released: bool,
}

impl EncodeSession {
    /// Build encoder and muxer. Anything built before a failure is released.
    pub fn open(backend: &dyn CodecBackend, config: &StreamConfig) -> Result<Self, RecordingError> {
        let output_path = resolve_output_path(config)?;

        let mut encoder = backend.create_encoder(config)?;
        let muxer = match backend.create_muxer(&output_path) {
            Ok(muxer) => muxer,
            Err(e) => {
                if let Err(stop_err) = encoder.stop() {
                    log::warn!("Failed to stop encoder after muxer error: {}", stop_err);
                }
                return Err(e);
            }
        };

        log::info!(
            "Encode session ready: {}x{} @ {} bps, {} fps -> {}",
            config.width,
            config.height,
            config.bit_rate,
            config.frame_rate,
            output_path.display()
        );

        let stats = RecordingStats {
            output_path: output_path.to_string_lossy().to_string(),
            ..Default::default()
        };

        Ok(Self {
            encoder,
            muxer,
            config: config.clone(),
            output_path,
            track: None,
            muxer_started: false,
            last_input_pts_us: 0,
            eos_queued: false,
            output_eos_seen: false,
            stats,
            released: false,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn stats(&self) -> &RecordingStats {
        &self.stats
    }

    pub fn input_surface(&self) -> Option<InputSurface> {
        self.encoder.input_surface()
    }

    /// Stop the encoder, then finalize the muxer. Both are attempted even
    /// if the first fails; the first error is returned.
    pub fn release(&mut self) -> Result<(), RecordingError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        log::debug!("Releasing encoder and muxer for {}", self.output_path.display());

        let encoder_result = self.encoder.stop();
        let muxer_result = self.muxer.stop();
        encoder_result.and(muxer_result)
    }
}

impl Drop for EncodeSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Error releasing encode session in drop: {}", e);
        }
    }
}

/// The configured path, or `<dir>/<prefix>_<yyyyMMdd_HHmmss>.mp4`
pub fn resolve_output_path(config: &StreamConfig) -> Result<PathBuf, RecordingError> {
    if let Some(path) = &config.output_path {
        return Ok(path.clone());
    }

    fs::create_dir_all(&config.output_directory).map_err(|e| {
        RecordingError::unavailable(format!(
            "Failed to create output directory {}: {}",
            config.output_directory.display(),
            e
        ))
    })?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    Ok(config
        .output_directory
        .join(format!("{}_{}.mp4", config.file_prefix, stamp)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackBackend;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_output_path_is_kept() {
        let config = StreamConfig::new(64, 48, 100_000, Some(PathBuf::from("/tmp/x.mp4")), false);
        assert_eq!(resolve_output_path(&config).unwrap(), PathBuf::from("/tmp/x.mp4"));
    }

    #[test]
    fn test_generated_output_name() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("DCIM").join("recordings");
        let config = StreamConfig::new(64, 48, 100_000, None, false)
            .with_output_directory(&nested, "VID");

        let path = resolve_output_path(&config).unwrap();

        assert!(nested.is_dir());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("VID_"));
        assert!(name.ends_with(".mp4"));
        // VID_ + yyyyMMdd_HHmmss + .mp4
        assert_eq!(name.len(), 4 + 15 + 4);
    }

    #[test]
    fn test_open_and_release_once() {
        let dir = tempdir().unwrap();
        let backend = LoopbackBackend::new();
        let config = StreamConfig::new(16, 16, 100_000, Some(dir.path().join("a.mp4")), false);

        let mut session = EncodeSession::open(&backend, &config).unwrap();
        assert_eq!(backend.encoders_created(), 1);
        assert_eq!(backend.muxers_created(), 1);

        session.release().unwrap();
        session.release().unwrap();
        assert_eq!(backend.log().muxer_stops(), 1);
    }

    #[test]
    fn test_muxer_failure_releases_encoder() {
        let backend = LoopbackBackend::new().failing_muxer();
        let config = StreamConfig::new(16, 16, 100_000, Some(PathBuf::from("/tmp/never.mp4")), false);

        let err = EncodeSession::open(&backend, &config).err().unwrap();
        assert!(matches!(err, RecordingError::ResourceUnavailable(_)));
        assert_eq!(backend.log().encoder_stops(), 1);
    }
}
