//! Multi-plane YUV 4:2:0 to packed layout conversion
//!
//! Camera sensors hand out images as three planes, each with its own row
//! stride (often padded by the hardware) and pixel stride (1 for true
//! planes, 2 when the chroma planes are views into an interleaved buffer).
//! [`convert`] repacks the cropped region into one of the [`PixelLayout`]s
//! an encoder accepts.

use crate::errors::RecordingError;
use crate::types::{CropRect, PixelLayout, Plane, PlaneImage, SourceFormat};

/// Byte size of the packed output for `crop` of an image in `format`.
pub fn required_size(format: SourceFormat, crop: &CropRect) -> Result<usize, RecordingError> {
    if !format.is_yuv420() {
        return Err(RecordingError::unsupported(format!(
            "cannot repack source format {:?}",
            format
        )));
    }
    // is_yuv420 guarantees a fixed bit depth
    let bpp = format.bits_per_pixel().unwrap_or(12);
    Ok(crop.width as usize * crop.height as usize * bpp / 8)
}

/// Where one source plane lands in the packed output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlanePlacement {
    offset: usize,
    stride: usize,
    /// log2 of the subsampling factor in both directions
    shift: u32,
}

fn placement(layout: PixelLayout, index: usize, width: usize, height: usize) -> PlanePlacement {
    let luma = width * height;
    let chroma = (width / 2) * (height / 2);
    let (offset, stride) = match (index, layout) {
        (0, _) => (0, 1),
        (1, PixelLayout::Planar420) => (luma, 1),
        (1, PixelLayout::SemiPlanar420VFirst) => (luma + 1, 2),
        (1, PixelLayout::SemiPlanar420UFirst) => (luma, 2),
        (_, PixelLayout::Planar420) => (luma + chroma, 1),
        (_, PixelLayout::SemiPlanar420VFirst) => (luma, 2),
        (_, PixelLayout::SemiPlanar420UFirst) => (luma + 1, 2),
    };
    PlanePlacement {
        offset,
        stride,
        shift: if index == 0 { 0 } else { 1 },
    }
}

/// Index of the first source byte of the crop within `plane`
fn crop_origin(plane: &Plane<'_>, crop: &CropRect, shift: u32) -> usize {
    plane.row_stride * (crop.top >> shift) as usize + plane.pixel_stride * (crop.left >> shift) as usize
}

/// Index of the last source byte read for a `w` x `h` plane region, or
/// `None` when the strides put it beyond addressable memory
fn last_read_index(plane: &Plane<'_>, crop: &CropRect, shift: u32, w: usize, h: usize) -> Option<usize> {
    let origin = plane
        .row_stride
        .checked_mul((crop.top >> shift) as usize)?
        .checked_add(plane.pixel_stride.checked_mul((crop.left >> shift) as usize)?)?;
    origin
        .checked_add((h - 1).checked_mul(plane.row_stride)?)?
        .checked_add((w - 1).checked_mul(plane.pixel_stride)?)
}

fn validate(
    source: &PlaneImage<'_>,
    crop: &CropRect,
    layout: PixelLayout,
    output_len: usize,
) -> Result<Vec<PlanePlacement>, RecordingError> {
    let expected = required_size(source.format, crop)?;
    if output_len != expected {
        return Err(RecordingError::SizeMismatch {
            expected,
            actual: output_len,
        });
    }
    if source.planes.len() != 3 {
        return Err(RecordingError::unsupported(format!(
            "expected 3 planes for {:?}, got {}",
            source.format,
            source.planes.len()
        )));
    }
    if crop.width % 2 != 0 || crop.height % 2 != 0 {
        return Err(RecordingError::unsupported(format!(
            "4:2:0 crop must have even dimensions, got {}x{}",
            crop.width, crop.height
        )));
    }
    if crop.right() > source.width as u64 || crop.bottom() > source.height as u64 {
        return Err(RecordingError::SizeMismatch {
            expected: source.width as usize * source.height as usize,
            actual: usize::try_from(crop.right().saturating_mul(crop.bottom())).unwrap_or(usize::MAX),
        });
    }

    let width = crop.width as usize;
    let height = crop.height as usize;
    let mut placements = Vec::with_capacity(3);

    for (index, plane) in source.planes.iter().enumerate() {
        let place = placement(layout, index, width, height);
        let w = width >> place.shift;
        let h = height >> place.shift;
        placements.push(place);
        if w == 0 || h == 0 {
            continue;
        }
        if plane.pixel_stride == 0 {
            return Err(RecordingError::unsupported(format!(
                "plane {index} has a zero pixel stride"
            )));
        }

        let last_read = last_read_index(plane, crop, place.shift, w, h);
        match last_read {
            Some(index) if index < plane.data.len() => {}
            _ => {
                return Err(RecordingError::SizeMismatch {
                    expected: last_read.map_or(usize::MAX, |index| index.saturating_add(1)),
                    actual: plane.data.len(),
                });
            }
        }

        let last_write = place.offset + (w * h - 1) * place.stride;
        if last_write >= output_len {
            return Err(RecordingError::SizeMismatch {
                expected: last_write + 1,
                actual: output_len,
            });
        }
    }

    Ok(placements)
}

/// Repack the `crop` region of `source` into `output` using `layout`.
///
/// `output` must already be exactly [`required_size`] bytes long; it is
/// not resized. Every check runs before the first byte is written, so on
/// error `output` is untouched.
pub fn convert(
    source: &PlaneImage<'_>,
    crop: &CropRect,
    layout: PixelLayout,
    output: &mut [u8],
) -> Result<(), RecordingError> {
    let placements = validate(source, crop, layout, output.len())?;
    let width = crop.width as usize;
    let height = crop.height as usize;
    let mut written = 0usize;

    for (plane, place) in source.planes.iter().zip(placements) {
        let w = width >> place.shift;
        let h = height >> place.shift;
        if w == 0 || h == 0 {
            continue;
        }
        let mut src_row = crop_origin(plane, crop, place.shift);
        let mut dst = place.offset;

        for _ in 0..h {
            if plane.pixel_stride == 1 && place.stride == 1 {
                output[dst..dst + w].copy_from_slice(&plane.data[src_row..src_row + w]);
                dst += w;
            } else {
                for col in 0..w {
                    output[dst] = plane.data[src_row + col * plane.pixel_stride];
                    dst += place.stride;
                }
            }
            written += w;
            src_row += plane.row_stride;
        }
    }

    crate::assert_invariant!(
        written == output.len(),
        "Converted sample count equals output size",
        "convert::convert"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x4 image, Y = 0..16, U = 100.., V = 200.., chroma planes interleaved
    /// NV12-style with a padded row stride of 6.
    fn interleaved_source(buf: &mut Vec<u8>) -> (usize, usize) {
        buf.clear();
        buf.extend(0u8..16);
        let uv_start = buf.len();
        for row in 0..2u8 {
            for col in 0..2u8 {
                buf.push(100 + row * 2 + col);
                buf.push(200 + row * 2 + col);
            }
            buf.extend([0xEE, 0xEE]);
        }
        (uv_start, uv_start + 1)
    }

    fn planes_from(buf: &[u8], u: usize, v: usize) -> PlaneImage<'_> {
        PlaneImage::new(
            SourceFormat::Yuv420Flexible,
            4,
            4,
            vec![
                Plane::new(&buf[..16], 4, 1),
                Plane::new(&buf[u..], 6, 2),
                Plane::new(&buf[v..], 6, 2),
            ],
        )
    }

    #[test]
    fn test_nv12_output() {
        let mut buf = Vec::new();
        let (u, v) = interleaved_source(&mut buf);
        let image = planes_from(&buf, u, v);
        let crop = CropRect::full(4, 4);
        let mut out = vec![0u8; 24];

        convert(&image, &crop, PixelLayout::SemiPlanar420UFirst, &mut out).unwrap();

        assert_eq!(&out[..16], &(0u8..16).collect::<Vec<_>>()[..]);
        assert_eq!(&out[16..], &[100, 200, 101, 201, 102, 202, 103, 203]);
    }

    #[test]
    fn test_nv21_swaps_chroma_order() {
        let mut buf = Vec::new();
        let (u, v) = interleaved_source(&mut buf);
        let image = planes_from(&buf, u, v);
        let mut out = vec![0u8; 24];

        convert(&image, &CropRect::full(4, 4), PixelLayout::SemiPlanar420VFirst, &mut out).unwrap();

        assert_eq!(&out[16..], &[200, 100, 201, 101, 202, 102, 203, 103]);
    }

    #[test]
    fn test_i420_places_planes_contiguously() {
        let mut buf = Vec::new();
        let (u, v) = interleaved_source(&mut buf);
        let image = planes_from(&buf, u, v);
        let mut out = vec![0u8; 24];

        convert(&image, &CropRect::full(4, 4), PixelLayout::Planar420, &mut out).unwrap();

        assert_eq!(&out[16..20], &[100, 101, 102, 103]);
        assert_eq!(&out[20..], &[200, 201, 202, 203]);
    }

    #[test]
    fn test_crop_offsets_source_reads() {
        // 4x4 luma with row stride 8 (4 bytes of padding per row)
        let mut luma = vec![0xFFu8; 32];
        for row in 0..4 {
            for col in 0..4 {
                luma[row * 8 + col] = (row * 4 + col) as u8;
            }
        }
        let u = vec![10u8, 11, 12, 13];
        let v = vec![20u8, 21, 22, 23];
        let image = PlaneImage::new(
            SourceFormat::Yuv420Flexible,
            4,
            4,
            vec![Plane::new(&luma, 8, 1), Plane::new(&u, 2, 1), Plane::new(&v, 2, 1)],
        );
        let crop = CropRect::new(2, 2, 2, 2);
        let mut out = vec![0u8; 6];

        convert(&image, &crop, PixelLayout::Planar420, &mut out).unwrap();

        assert_eq!(out, vec![10, 11, 14, 15, 13, 23]);
    }

    #[test]
    fn test_short_output_is_rejected_untouched() {
        let mut buf = Vec::new();
        let (u, v) = interleaved_source(&mut buf);
        let image = planes_from(&buf, u, v);
        let mut out = vec![0xAAu8; 23];

        let err = convert(&image, &CropRect::full(4, 4), PixelLayout::default(), &mut out)
            .unwrap_err();

        assert!(matches!(err, RecordingError::SizeMismatch { expected: 24, actual: 23 }));
        assert!(out.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_unsupported_format() {
        let data = vec![0u8; 64];
        let image = PlaneImage::new(
            SourceFormat::Rgba8888,
            4,
            4,
            vec![Plane::new(&data, 16, 4)],
        );
        let mut out = vec![0u8; 24];
        let err = convert(&image, &CropRect::full(4, 4), PixelLayout::default(), &mut out)
            .unwrap_err();
        assert!(matches!(err, RecordingError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_truncated_plane_is_rejected() {
        let mut buf = Vec::new();
        let (u, v) = interleaved_source(&mut buf);
        let mut image = planes_from(&buf, u, v);
        image.planes[0] = Plane::new(&buf[..15], 4, 1);
        let mut out = vec![0u8; 24];

        let err = convert(&image, &CropRect::full(4, 4), PixelLayout::default(), &mut out)
            .unwrap_err();
        assert!(matches!(err, RecordingError::SizeMismatch { expected: 16, actual: 15 }));
    }

    #[test]
    fn test_crop_edge_past_u32_range_is_rejected() {
        let mut buf = Vec::new();
        let (u, v) = interleaved_source(&mut buf);
        let image = planes_from(&buf, u, v);
        let mut out = vec![0u8; 6];

        for crop in [
            CropRect::new(u32::MAX - 1, 0, 2, 2),
            CropRect::new(0, u32::MAX - 1, 2, 2),
        ] {
            let err = convert(&image, &crop, PixelLayout::Planar420, &mut out).unwrap_err();
            assert!(matches!(err, RecordingError::SizeMismatch { .. }));
        }
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_crop_outside_image() {
        let mut buf = Vec::new();
        let (u, v) = interleaved_source(&mut buf);
        let image = planes_from(&buf, u, v);
        let crop = CropRect::new(2, 2, 4, 4);
        let mut out = vec![0u8; 24];
        assert!(convert(&image, &crop, PixelLayout::default(), &mut out).is_err());
    }

    #[test]
    fn test_packed_round_trip_to_planar() {
        let nv12: Vec<u8> = (0..24u8).collect();
        let image = PlaneImage::from_packed(PixelLayout::SemiPlanar420UFirst, 4, 4, &nv12);
        let mut out = vec![0u8; 24];

        convert(&image, &CropRect::full(4, 4), PixelLayout::Planar420, &mut out).unwrap();

        assert_eq!(&out[16..20], &[16, 18, 20, 22]);
        assert_eq!(&out[20..], &[17, 19, 21, 23]);
    }
}
