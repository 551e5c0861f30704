//! Core data types shared by the capture, conversion and recording stages

use serde::{Deserialize, Serialize};

/// A pooled frame buffer plus its presentation timestamp.
///
/// `pts_us` is microseconds relative to the first captured frame, `None`
/// until the capture side stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub pts_us: Option<i64>,
}

impl Frame {
    /// Allocate a zeroed frame of exactly `size` bytes
    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
            pts_us: None,
        }
    }

    pub fn from_data(data: Vec<u8>, pts_us: i64) -> Self {
        Self {
            data,
            pts_us: Some(pts_us),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Resize in place, reusing the existing allocation where possible
    pub fn resize(&mut self, size: usize) {
        self.data.resize(size, 0);
    }

    /// Clear the timestamp back to the unset sentinel
    pub fn reset(&mut self) {
        self.pts_us = None;
    }
}

/// Packed chroma-subsampled output layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PixelLayout {
    /// I420: Y plane, then U plane, then V plane
    Planar420,
    /// NV21: Y plane, then interleaved V/U
    SemiPlanar420VFirst,
    /// NV12: Y plane, then interleaved U/V
    #[default]
    SemiPlanar420UFirst,
}

impl PixelLayout {
    pub fn bits_per_pixel(&self) -> usize {
        12
    }

    /// Byte size of a packed `width` x `height` image in this layout
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bits_per_pixel() / 8
    }

    /// File extension used when dumping raw frames
    pub fn extension(&self) -> &'static str {
        match self {
            PixelLayout::Planar420 => "i420",
            PixelLayout::SemiPlanar420VFirst => "nv21",
            PixelLayout::SemiPlanar420UFirst => "nv12",
        }
    }
}

/// Pixel format of a source image as reported by the sensor layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    /// Flexible three-plane YUV 4:2:0 (strides describe the real layout)
    Yuv420Flexible,
    Nv21,
    Yv12,
    Rgba8888,
    Jpeg,
    Raw16,
}

impl SourceFormat {
    /// Bits per pixel, or `None` for formats without a fixed packing
    pub fn bits_per_pixel(&self) -> Option<usize> {
        match self {
            SourceFormat::Yuv420Flexible | SourceFormat::Nv21 | SourceFormat::Yv12 => Some(12),
            SourceFormat::Rgba8888 => Some(32),
            SourceFormat::Raw16 => Some(16),
            SourceFormat::Jpeg => None,
        }
    }

    /// Whether the plane converter can repack this format
    pub fn is_yuv420(&self) -> bool {
        matches!(
            self,
            SourceFormat::Yuv420Flexible | SourceFormat::Nv21 | SourceFormat::Yv12
        )
    }
}

/// Crop rectangle in full-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge, widened so `left + width` cannot overflow
    pub fn right(&self) -> u64 {
        self.left as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.top as u64 + self.height as u64
    }
}

/// One colour-component plane of a multi-plane image
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows (may include padding)
    pub row_stride: usize,
    /// Bytes between consecutive samples within a row
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }
}

/// A borrowed multi-plane image as delivered by the capture callback
#[derive(Debug, Clone)]
pub struct PlaneImage<'a> {
    pub format: SourceFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Plane<'a>>,
    pub crop: CropRect,
}

impl<'a> PlaneImage<'a> {
    pub fn new(format: SourceFormat, width: u32, height: u32, planes: Vec<Plane<'a>>) -> Self {
        Self {
            format,
            width,
            height,
            planes,
            crop: CropRect::full(width, height),
        }
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = crop;
        self
    }

    /// Describe an already packed 4:2:0 buffer as planes, so it can be
    /// repacked into another layout.
    pub fn from_packed(layout: PixelLayout, width: u32, height: u32, data: &'a [u8]) -> Self {
        let w = width as usize;
        let h = height as usize;
        let luma = w * h;
        let chroma = (w / 2) * (h / 2);
        let clamp = |start: usize| data.get(start..).unwrap_or(&[]);

        let planes = match layout {
            PixelLayout::Planar420 => vec![
                Plane::new(data, w, 1),
                Plane::new(clamp(luma), w / 2, 1),
                Plane::new(clamp(luma + chroma), w / 2, 1),
            ],
            PixelLayout::SemiPlanar420UFirst => vec![
                Plane::new(data, w, 1),
                Plane::new(clamp(luma), w, 2),
                Plane::new(clamp(luma + 1), w, 2),
            ],
            PixelLayout::SemiPlanar420VFirst => vec![
                Plane::new(data, w, 1),
                Plane::new(clamp(luma + 1), w, 2),
                Plane::new(clamp(luma), w, 2),
            ],
        };

        Self::new(SourceFormat::Yuv420Flexible, width, height, planes)
    }
}
