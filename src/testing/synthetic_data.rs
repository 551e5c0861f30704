//! Synthetic camera images
//!
//! Generates multi-plane 4:2:0 images the way camera HALs hand them out:
//! rows padded past the visible width, chroma either planar or interleaved
//! with a pixel stride of 2. Content is a gradient that moves every frame
//! so encoders see temporal change.

use crate::types::{CropRect, Plane, PlaneImage, SourceFormat};

/// Row alignment used for padded strides
pub const STRIDE_ALIGNMENT: usize = 64;

/// Owned plane buffers behind a [`PlaneImage`]
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub y_row_stride: usize,
    pub chroma_row_stride: usize,
    pub chroma_pixel_stride: usize,
    /// Offset of V within the interleaved chroma buffer (0 or 1)
    interleaved_v_first: Option<bool>,
    crop: Option<CropRect>,
}

impl SyntheticImage {
    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = Some(crop);
        self
    }

    /// Borrow the buffers as a flexible-YUV image
    pub fn as_image(&self) -> PlaneImage<'_> {
        let planes = match self.interleaved_v_first {
            None => vec![
                Plane::new(&self.y, self.y_row_stride, 1),
                Plane::new(&self.u, self.chroma_row_stride, 1),
                Plane::new(&self.v, self.chroma_row_stride, 1),
            ],
            // One shared buffer, U and V views offset by one byte
            Some(v_first) => {
                let (u_off, v_off) = if v_first { (1, 0) } else { (0, 1) };
                vec![
                    Plane::new(&self.y, self.y_row_stride, 1),
                    Plane::new(&self.u[u_off..], self.chroma_row_stride, 2),
                    Plane::new(&self.u[v_off..], self.chroma_row_stride, 2),
                ]
            }
        };
        let image = PlaneImage::new(SourceFormat::Yuv420Flexible, self.width, self.height, planes);
        match self.crop {
            Some(crop) => image.with_crop(crop),
            None => image,
        }
    }

    /// Luma sample at visible coordinates
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        self.y[y as usize * self.y_row_stride + x as usize]
    }

    /// (U, V) sample for the 2x2 block containing `(x, y)`
    pub fn chroma(&self, x: u32, y: u32) -> (u8, u8) {
        let (cx, cy) = ((x / 2) as usize, (y / 2) as usize);
        match self.interleaved_v_first {
            None => {
                let idx = cy * self.chroma_row_stride + cx;
                (self.u[idx], self.v[idx])
            }
            Some(v_first) => {
                let idx = cy * self.chroma_row_stride + cx * 2;
                let (a, b) = (self.u[idx], self.u[idx + 1]);
                if v_first {
                    (b, a)
                } else {
                    (a, b)
                }
            }
        }
    }
}

fn aligned(width: usize) -> usize {
    width.div_ceil(STRIDE_ALIGNMENT) * STRIDE_ALIGNMENT
}

fn luma_value(frame_number: u64, x: u32, y: u32) -> u8 {
    (frame_number as u32).wrapping_add(x).wrapping_add(y) as u8
}

fn u_value(frame_number: u64, cx: u32, cy: u32) -> u8 {
    128u8.wrapping_add((frame_number as u8).wrapping_add((cx % 32) as u8))
        .wrapping_sub(cy as u8 % 16)
}

fn v_value(frame_number: u64, cx: u32, cy: u32) -> u8 {
    64u8.wrapping_add((cy % 64) as u8)
        .wrapping_sub((frame_number as u8).wrapping_add(cx as u8) % 8)
}

fn luma_plane(frame_number: u64, width: u32, height: u32, stride: usize) -> Vec<u8> {
    // Padding bytes stay 0xEE so stray reads show up in assertions
    let mut data = vec![0xEE; stride * height as usize];
    for y in 0..height {
        let row = y as usize * stride;
        for x in 0..width {
            data[row + x as usize] = luma_value(frame_number, x, y);
        }
    }
    data
}

/// Fully planar I420-style image with padded rows
pub fn synthetic_planar_image(frame_number: u64, width: u32, height: u32) -> SyntheticImage {
    let y_row_stride = aligned(width as usize);
    let chroma_row_stride = aligned(width as usize / 2);
    let (cw, ch) = (width / 2, height / 2);

    let mut u = vec![0xEE; chroma_row_stride * ch as usize];
    let mut v = vec![0xEE; chroma_row_stride * ch as usize];
    for cy in 0..ch {
        for cx in 0..cw {
            let idx = cy as usize * chroma_row_stride + cx as usize;
            u[idx] = u_value(frame_number, cx, cy);
            v[idx] = v_value(frame_number, cx, cy);
        }
    }

    SyntheticImage {
        width,
        height,
        y: luma_plane(frame_number, width, height, y_row_stride),
        u,
        v,
        y_row_stride,
        chroma_row_stride,
        chroma_pixel_stride: 1,
        interleaved_v_first: None,
        crop: None,
    }
}

/// Semi-planar image: chroma interleaved in one buffer (NV21 when `v_first`)
pub fn synthetic_semiplanar_image(
    frame_number: u64,
    width: u32,
    height: u32,
    v_first: bool,
) -> SyntheticImage {
    let y_row_stride = aligned(width as usize);
    let chroma_row_stride = aligned(width as usize);
    let (cw, ch) = (width / 2, height / 2);

    // The last V (or U) view ends one byte short, as on real devices
    let mut chroma = vec![0xEE; chroma_row_stride * ch as usize];
    for cy in 0..ch {
        for cx in 0..cw {
            let idx = cy as usize * chroma_row_stride + cx as usize * 2;
            let (u, v) = (u_value(frame_number, cx, cy), v_value(frame_number, cx, cy));
            if v_first {
                chroma[idx] = v;
                chroma[idx + 1] = u;
            } else {
                chroma[idx] = u;
                chroma[idx + 1] = v;
            }
        }
    }

    SyntheticImage {
        width,
        height,
        y: luma_plane(frame_number, width, height, y_row_stride),
        u: chroma,
        v: Vec::new(),
        y_row_stride,
        chroma_row_stride,
        chroma_pixel_stride: 2,
        interleaved_v_first: Some(v_first),
        crop: None,
    }
}

/// Tightly packed frame in the encoder's default layout (U-first semi-planar)
pub fn synthetic_packed_frame(frame_number: u64, width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut data = Vec::with_capacity(w * h * 3 / 2);
    for y in 0..height {
        for x in 0..width {
            data.push(luma_value(frame_number, x, y));
        }
    }
    for cy in 0..height / 2 {
        for cx in 0..width / 2 {
            data.push(u_value(frame_number, cx, cy));
            data.push(v_value(frame_number, cx, cy));
        }
    }
    data
}
