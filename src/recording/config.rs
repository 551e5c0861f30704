//! Recording configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::PixelLayout;

/// Frame rate used when a configuration does not name one
pub const DEFAULT_FRAME_RATE: u32 = 30;
/// Seconds between forced key frames
pub const DEFAULT_I_FRAME_INTERVAL_SECS: u32 = 1;

/// Quality presets for video recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecordingQuality {
    /// 720p, lower bitrate
    Low,
    /// 1080p, standard bitrate
    Medium,
    /// 1080p, high bitrate
    #[default]
    High,
    Custom,
}

impl RecordingQuality {
    /// Recommended bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        match self {
            RecordingQuality::Low => 2_500_000,
            RecordingQuality::Medium => 5_000_000,
            RecordingQuality::High => 10_000_000,
            RecordingQuality::Custom => 5_000_000,
        }
    }

    /// Recommended resolution (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            RecordingQuality::Low => (1280, 720),
            RecordingQuality::Medium | RecordingQuality::High | RecordingQuality::Custom => {
                (1920, 1080)
            }
        }
    }
}

/// Encoder and container settings for one recording stream.
///
/// Equality is what decides whether `configure` has to rebuild the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second
    pub bit_rate: u32,
    pub frame_rate: u32,
    pub i_frame_interval_secs: u32,
    /// Output file; `None` picks a timestamped name in `output_directory`
    pub output_path: Option<PathBuf>,
    pub output_directory: PathBuf,
    pub file_prefix: String,
    /// Frames come from an encoder input surface instead of a data provider
    pub uses_producer_surface: bool,
    /// Packed layout of frames handed to the encoder
    pub layout: PixelLayout,
}

impl StreamConfig {
    pub fn new(
        width: u32,
        height: u32,
        bit_rate: u32,
        output_path: Option<PathBuf>,
        uses_producer_surface: bool,
    ) -> Self {
        Self {
            width,
            height,
            bit_rate,
            frame_rate: DEFAULT_FRAME_RATE,
            i_frame_interval_secs: DEFAULT_I_FRAME_INTERVAL_SECS,
            output_path,
            output_directory: PathBuf::from("."),
            file_prefix: "VID".to_string(),
            uses_producer_surface,
            layout: PixelLayout::default(),
        }
    }

    pub fn from_quality(quality: RecordingQuality, output_path: Option<PathBuf>) -> Self {
        let (width, height) = quality.resolution();
        Self::new(width, height, quality.bitrate(), output_path, false)
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_i_frame_interval(mut self, seconds: u32) -> Self {
        self.i_frame_interval_secs = seconds;
        self
    }

    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.output_directory = dir.into();
        self.file_prefix = prefix.into();
        self
    }

    /// Packed bytes per frame for this stream
    pub fn frame_size(&self) -> usize {
        self.layout.frame_size(self.width, self.height)
    }

    /// Nominal spacing between frames, whole milliseconds (33 ms at 30 fps).
    /// Never zero, so end of stream always lands after the last frame.
    pub fn frame_interval_us(&self) -> i64 {
        let fps = self.frame_rate.max(1) as i64;
        match (1000 / fps) * 1000 {
            0 => (1_000_000 / fps).max(1),
            interval => interval,
        }
    }

    /// Frames between forced key frames
    pub fn key_frame_interval(&self) -> u64 {
        (self.frame_rate as u64 * self.i_frame_interval_secs as u64).max(1)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("Invalid resolution {}x{}", self.width, self.height));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err("Resolution must be even for 4:2:0 video".to_string());
        }
        if self.bit_rate == 0 {
            return Err("Bitrate must be positive".to_string());
        }
        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err("Invalid frame rate (must be 1-240)".to_string());
        }
        Ok(())
    }
}

/// Statistics returned after finishing a recording
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingStats {
    /// Frames copied into encoder input slots
    pub frames_queued: u64,
    /// Compressed samples written to the container
    pub samples_written: u64,
    /// Frames skipped because no encoder input slot freed up in time
    pub input_timeouts: u64,
    pub bytes_written: u64,
    pub first_sample_us: Option<i64>,
    pub last_sample_us: Option<i64>,
    pub output_path: String,
}

impl RecordingStats {
    /// Span between first and last written sample, in seconds
    pub fn duration_secs(&self) -> f64 {
        match (self.first_sample_us, self.last_sample_us) {
            (Some(first), Some(last)) if last > first => (last - first) as f64 / 1_000_000.0,
            _ => 0.0,
        }
    }

    /// Average bitrate achieved
    pub fn avg_bitrate(&self) -> f64 {
        let duration = self.duration_secs();
        if duration > 0.0 {
            (self.bytes_written as f64 * 8.0) / duration
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval_truncates_to_whole_milliseconds() {
        let config = StreamConfig::new(176, 144, 500_000, None, false);
        assert_eq!(config.frame_interval_us(), 33_000);
        assert_eq!(config.with_frame_rate(60).frame_interval_us(), 16_000);
    }

    #[test]
    fn test_frame_interval_positive_above_1000_fps() {
        let config = StreamConfig::new(176, 144, 500_000, None, false);
        assert_eq!(config.clone().with_frame_rate(1000).frame_interval_us(), 1_000);
        assert_eq!(config.clone().with_frame_rate(2000).frame_interval_us(), 500);
        assert_eq!(config.clone().with_frame_rate(u32::MAX).frame_interval_us(), 1);
        assert!(config.with_frame_rate(2000).validate().is_err());
    }

    #[test]
    fn test_key_frame_interval_never_zero() {
        let config = StreamConfig::new(176, 144, 500_000, None, false).with_i_frame_interval(0);
        assert_eq!(config.key_frame_interval(), 1);
    }

    #[test]
    fn test_stats_duration_and_bitrate() {
        let stats = RecordingStats {
            bytes_written: 125_000,
            first_sample_us: Some(0),
            last_sample_us: Some(1_000_000),
            ..Default::default()
        };
        assert!((stats.duration_secs() - 1.0).abs() < f64::EPSILON);
        assert!((stats.avg_bitrate() - 1_000_000.0).abs() < 1e-6);
        assert_eq!(RecordingStats::default().avg_bitrate(), 0.0);
    }

    #[test]
    fn test_config_equality_drives_reconfigure() {
        let a = StreamConfig::new(176, 144, 500_000, None, false);
        assert_eq!(a, a.clone());
        assert_ne!(a, a.clone().with_layout(PixelLayout::Planar420));
    }
}
