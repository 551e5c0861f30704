//! Capture callback adapter
//!
//! Turns each multi-plane camera image into a packed, timestamped [`Frame`]
//! and publishes it to a [`FrameSink`] (a [`FramePool`](crate::pool::FramePool)
//! or an encoder input surface).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::convert::{convert, required_size};
use crate::errors::RecordingError;
use crate::pool::FrameSink;
use crate::timing::PtsBaseline;
use crate::types::{PixelLayout, PlaneImage};

pub struct CaptureBridge<S: FrameSink> {
    sink: Arc<S>,
    layout: PixelLayout,
    baseline: PtsBaseline,
    delivered: AtomicU64,
    dump_directory: Option<PathBuf>,
}

impl<S: FrameSink> CaptureBridge<S> {
    pub fn new(sink: Arc<S>, layout: PixelLayout) -> Self {
        Self {
            sink,
            layout,
            baseline: PtsBaseline::new(),
            delivered: AtomicU64::new(0),
            dump_directory: None,
        }
    }

    /// Also write every converted frame to `dir` for offline inspection
    pub fn with_raw_dump(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_directory = Some(dir.into());
        self
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn delivered_frames(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Handle one captured image.
    ///
    /// On error nothing is published and the acquired buffer is dropped.
    pub fn on_image(&self, image: &PlaneImage<'_>, sensor_timestamp_ns: i64) -> Result<(), RecordingError> {
        let crop = image.crop;
        let size = required_size(image.format, &crop)?;

        let mut frame = self.sink.acquire(size);
        convert(image, &crop, self.layout, &mut frame.data)?;
        frame.pts_us = Some(self.baseline.pts_us(sensor_timestamp_ns));

        if let Some(dir) = &self.dump_directory {
            let dumped = dump_frame(
                dir,
                &frame.data,
                sensor_timestamp_ns,
                crop.width,
                crop.height,
                self.layout,
            );
            if let Err(e) = dumped {
                log::warn!("Failed to dump raw frame: {}", e);
            }
        }

        log::trace!("Publishing {} byte frame at {:?} us", frame.len(), frame.pts_us);
        self.sink.publish(frame);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Start a new timeline: the next image becomes pts 0
    pub fn reset(&self) {
        self.baseline.reset();
        self.delivered.store(0, Ordering::Relaxed);
    }
}

fn dump_frame(
    dir: &Path,
    data: &[u8],
    sensor_timestamp_ns: i64,
    width: u32,
    height: u32,
    layout: PixelLayout,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "dumpImage_{}_{}x{}.{}",
        sensor_timestamp_ns,
        width,
        height,
        layout.extension()
    ));
    fs::write(&path, data)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FramePool;
    use crate::testing::{synthetic_planar_image, synthetic_semiplanar_image};
    use crate::types::{CropRect, Plane, SourceFormat};
    use tempfile::tempdir;

    #[test]
    fn test_first_image_is_pts_zero() {
        let pool = Arc::new(FramePool::new(4));
        let bridge = CaptureBridge::new(pool.clone(), PixelLayout::SemiPlanar420UFirst);
        let image = synthetic_planar_image(0, 32, 16);

        bridge.on_image(&image.as_image(), 5_000_000_000).unwrap();
        bridge.on_image(&image.as_image(), 5_033_000_000).unwrap();

        assert_eq!(pool.consume().unwrap().pts_us, Some(0));
        assert_eq!(pool.consume().unwrap().pts_us, Some(33_000));
        assert_eq!(bridge.delivered_frames(), 2);
    }

    #[test]
    fn test_frame_holds_converted_crop() {
        let pool = Arc::new(FramePool::new(4));
        let bridge = CaptureBridge::new(pool.clone(), PixelLayout::Planar420);
        let image = synthetic_semiplanar_image(7, 64, 32, true).with_crop(CropRect::new(8, 4, 16, 8));

        bridge.on_image(&image.as_image(), 0).unwrap();

        let frame = pool.consume().unwrap();
        assert_eq!(frame.len(), 16 * 8 * 3 / 2);
        assert_eq!(frame.data[0], image.luma(8, 4));
        let (u, v) = image.chroma(8, 4);
        assert_eq!(frame.data[16 * 8], u);
        assert_eq!(frame.data[16 * 8 + 8 * 4], v);
    }

    #[test]
    fn test_unsupported_format_publishes_nothing() {
        let pool = Arc::new(FramePool::new(4));
        let bridge = CaptureBridge::new(pool.clone(), PixelLayout::default());
        let jpeg = [0xFFu8; 64];
        let image = PlaneImage::new(SourceFormat::Jpeg, 8, 8, vec![Plane::new(&jpeg, 8, 1)]);

        let err = bridge.on_image(&image, 0).unwrap_err();
        assert!(matches!(err, RecordingError::UnsupportedFormat(_)));
        assert_eq!(pool.ready_len(), 0);
        assert_eq!(bridge.delivered_frames(), 0);
    }

    #[test]
    fn test_reset_restarts_timeline() {
        let pool = Arc::new(FramePool::new(4));
        let bridge = CaptureBridge::new(pool.clone(), PixelLayout::default());
        let image = synthetic_planar_image(0, 16, 16);

        bridge.on_image(&image.as_image(), 1_000_000).unwrap();
        bridge.reset();
        bridge.on_image(&image.as_image(), 9_000_000).unwrap();

        pool.consume();
        assert_eq!(pool.consume().unwrap().pts_us, Some(0));
        assert_eq!(bridge.delivered_frames(), 1);
    }

    #[test]
    fn test_raw_dump_file_name() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(FramePool::new(4));
        let bridge = CaptureBridge::new(pool, PixelLayout::SemiPlanar420UFirst)
            .with_raw_dump(dir.path());
        let image = synthetic_planar_image(0, 16, 16);

        bridge.on_image(&image.as_image(), 123_456).unwrap();

        let dumped = dir.path().join("dumpImage_123456_16x16.nv12");
        assert_eq!(fs::metadata(dumped).unwrap().len(), 16 * 16 * 3 / 2);
    }
}
