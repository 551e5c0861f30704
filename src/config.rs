//! Configuration management for crabcorder
//!
//! Provides loading, saving and validation of recorder settings: stream
//! encoding parameters, frame pool sizing and output storage.

use crate::errors::RecordingError;
use crate::pool::DEFAULT_POOL_CAPACITY;
use crate::recording::{StreamConfig, DEFAULT_FRAME_RATE, DEFAULT_I_FRAME_INTERVAL_SECS};
use crate::types::PixelLayout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub stream: StreamSettings,
    pub pool: PoolSettings,
    pub storage: StorageSettings,
}

/// Encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second
    pub bit_rate: u32,
    pub frame_rate: u32,
    pub i_frame_interval_secs: u32,
    /// Packed layout frames are converted into
    pub layout: PixelLayout,
    /// Feed the encoder through its input surface instead of the frame pool
    pub uses_producer_surface: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Frames buffered between capture and encoder
    pub capacity: usize,
}

/// Output file management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub output_directory: String,
    /// Recordings are named `<prefix>_<yyyyMMdd_HHmmss>.mp4`
    pub file_prefix: String,
    /// Write every converted frame to `dump_directory`
    pub dump_raw_frames: bool,
    pub dump_directory: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            stream: StreamSettings {
                width: 1280,
                height: 720,
                bit_rate: 5_000_000,
                frame_rate: DEFAULT_FRAME_RATE,
                i_frame_interval_secs: DEFAULT_I_FRAME_INTERVAL_SECS,
                layout: PixelLayout::default(),
                uses_producer_surface: false,
            },
            pool: PoolSettings {
                capacity: DEFAULT_POOL_CAPACITY,
            },
            storage: StorageSettings {
                output_directory: "./recordings".to_string(),
                file_prefix: "VID".to_string(),
                dump_raw_frames: false,
                dump_directory: "./frame_dumps".to_string(),
            },
        }
    }
}

impl RecorderConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RecordingError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            RecordingError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: RecorderConfig = toml::from_str(&contents).map_err(|e| {
            RecordingError::Config(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RecordingError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RecordingError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            RecordingError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            RecordingError::Config(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabcorder.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        self.stream_config(None).validate()?;

        if self.pool.capacity == 0 || self.pool.capacity > 120 {
            return Err("Pool capacity must be between 1 and 120".to_string());
        }

        if self.storage.file_prefix.is_empty() {
            return Err("File prefix must not be empty".to_string());
        }
        if self
            .storage
            .file_prefix
            .contains(|c: char| c == '/' || c == '\\')
        {
            return Err("File prefix must not contain path separators".to_string());
        }
        if self.storage.dump_raw_frames && self.storage.dump_directory.is_empty() {
            return Err("Raw frame dumps need a dump directory".to_string());
        }

        Ok(())
    }

    /// Stream configuration for a recording. Without `output_path` the
    /// session picks a timestamped name in the storage directory.
    pub fn stream_config(&self, output_path: Option<PathBuf>) -> StreamConfig {
        let s = &self.stream;
        StreamConfig::new(s.width, s.height, s.bit_rate, output_path, s.uses_producer_surface)
            .with_frame_rate(s.frame_rate)
            .with_i_frame_interval(s.i_frame_interval_secs)
            .with_layout(s.layout)
            .with_output_directory(&self.storage.output_directory, self.storage.file_prefix.clone())
    }

    /// Where raw frames go, if dumping is enabled
    pub fn dump_directory(&self) -> Option<PathBuf> {
        self.storage
            .dump_raw_frames
            .then(|| PathBuf::from(&self.storage.dump_directory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::default();
        assert_eq!((config.stream.width, config.stream.height), (1280, 720));
        assert_eq!(config.stream.frame_rate, 30);
        assert_eq!(config.pool.capacity, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = RecorderConfig::default();
        bad.stream.width = 0;
        assert!(bad.validate().is_err());

        let mut odd = RecorderConfig::default();
        odd.stream.height = 721;
        assert!(odd.validate().is_err());

        let mut no_pool = RecorderConfig::default();
        no_pool.pool.capacity = 0;
        assert!(no_pool.validate().is_err());

        let mut bad_prefix = RecorderConfig::default();
        bad_prefix.storage.file_prefix = "a/b".to_string();
        assert!(bad_prefix.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nested").join("crabcorder.toml");

        let mut config = RecorderConfig::default();
        config.stream.layout = PixelLayout::Planar420;
        config.storage.dump_raw_frames = true;
        config.save_to_file(&config_path).unwrap();

        let loaded = RecorderConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&RecorderConfig::default()).unwrap();

        assert!(toml_string.contains("[stream]"));
        assert!(toml_string.contains("[pool]"));
        assert!(toml_string.contains("[storage]"));
        assert!(toml_string.contains("bit_rate"));
        assert!(toml_string.contains("SemiPlanar420UFirst"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = RecorderConfig::load_from_file("nonexistent_file.toml");
        assert_eq!(result.unwrap(), RecorderConfig::default());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[stream]\nwidth = \"wide\"\n").unwrap();

        let err = RecorderConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, RecordingError::Config(_)));
    }

    #[test]
    fn test_stream_config_carries_settings() {
        let mut config = RecorderConfig::default();
        config.stream.frame_rate = 24;
        config.storage.file_prefix = "CLIP".to_string();

        let stream = config.stream_config(None);
        assert_eq!(stream.frame_rate, 24);
        assert_eq!(stream.file_prefix, "CLIP");
        assert_eq!(stream.output_directory, PathBuf::from("./recordings"));
        assert!(stream.output_path.is_none());
        assert_eq!(config.dump_directory(), None);
    }
}
