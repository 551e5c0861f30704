//! Property-Based Tests for the openh264 + muxide recording backend
//!
//! These tests run real encodes into real MP4 files and verify the
//! contracts of the recording pipeline end to end.
//!
//! Run with: cargo test --test recording_props --features recording

use proptest::prelude::*;
use tempfile::tempdir;

#[cfg(feature = "recording")]
mod recording_tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crabcorder::pool::FramePool;
    use crabcorder::recording::{
        BufferInfo, EncoderStatus, H264Backend, H264Encoder, InputSlot, RecordingStream,
        StreamConfig, VideoEncoder,
    };
    use crabcorder::testing::synthetic_packed_frame;
    use crabcorder::types::{Frame, PixelLayout};

    fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    fn flat_frame(width: u32, height: u32, level: u8) -> Vec<u8> {
        let luma = (width * height) as usize;
        let mut data = vec![level; luma];
        data.resize(luma * 3 / 2, 128);
        data
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // END TO END
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn qcif_recording_produces_single_track_mp4() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("qcif.mp4");

        let pool = Arc::new(FramePool::new(32));
        let stream = RecordingStream::new(Arc::new(H264Backend::default()));
        stream.set_data_provider(pool.clone());
        stream
            .configure(StreamConfig::new(176, 144, 500_000, Some(output.clone()), false))
            .expect("configure");
        stream.start().expect("start");

        for i in 0..30i64 {
            pool.publish(Frame::from_data(flat_frame(176, 144, (i * 7) as u8), i * 33_000));
        }

        let stats = stream.stop().expect("stop").expect("was recording");

        assert!(stats.samples_written > 0);
        assert!(stats.samples_written + stats.input_timeouts <= 30);
        assert!(stats.last_sample_us.unwrap() >= 957_000);

        let bytes = std::fs::read(&output).expect("output exists");
        assert!(!bytes.is_empty());
        assert_eq!(count_occurrences(&bytes, b"trak"), 1, "exactly one track");
        assert_eq!(count_occurrences(&bytes, b"moov"), 1);
    }

    #[test]
    fn reconfigure_produces_two_files() {
        let dir = tempdir().expect("tempdir");
        let pool = Arc::new(FramePool::new(8));
        let stream = RecordingStream::new(Arc::new(H264Backend::default()));
        stream.set_data_provider(pool.clone());

        for (n, size) in [(176u32, 144u32), (320, 240)].into_iter().enumerate() {
            let output = dir.path().join(format!("clip{}.mp4", n));
            stream
                .configure(StreamConfig::new(size.0, size.1, 500_000, Some(output.clone()), false))
                .expect("configure");
            stream.start().expect("start");
            for i in 0..5i64 {
                pool.publish(Frame::from_data(flat_frame(size.0, size.1, 60), i * 33_000));
            }
            stream.stop().expect("stop");
            assert!(std::fs::metadata(&output).expect("file").len() > 0);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // H264 ENCODER INVARIANTS
    // ═══════════════════════════════════════════════════════════════════════════

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// INVARIANT: Encoded units are Annex B and the first picture is a keyframe
        #[test]
        fn first_picture_is_annex_b_keyframe(
            layout in prop::sample::select(vec![
                PixelLayout::Planar420,
                PixelLayout::SemiPlanar420UFirst,
                PixelLayout::SemiPlanar420VFirst,
            ]),
            frame_number in 0u64..255,
        ) {
            let config = StreamConfig::new(320, 240, 1_000_000, None, false).with_layout(layout);
            let mut encoder = H264Encoder::new(&config).expect("Encoder creation should succeed");
            let frame = synthetic_packed_frame(frame_number, 320, 240);

            encoder
                .queue_input(InputSlot(0), &frame, BufferInfo::sample(frame.len(), 0))
                .expect("Encoding should succeed");

            let mut picture = None;
            loop {
                match encoder.dequeue_output(Duration::ZERO).expect("dequeue") {
                    EncoderStatus::Output(unit) if !unit.info.codec_config => {
                        picture = Some(unit);
                        break;
                    }
                    EncoderStatus::Output(unit) => {
                        prop_assert!(unit.data.starts_with(&[0, 0, 0, 1]));
                        encoder.release_output(unit.slot).expect("release");
                    }
                    EncoderStatus::OutputFormatChanged(format) => {
                        prop_assert!(!format.csd.is_empty());
                    }
                    EncoderStatus::TryAgainLater => break,
                }
            }

            let picture = picture.expect("first frame produces a picture");
            prop_assert!(picture.info.key_frame, "First frame must be a keyframe");
            prop_assert!(
                picture.data.starts_with(&[0, 0, 0, 1]) || picture.data.starts_with(&[0, 0, 1]),
                "Encoded frame should start with Annex B prefix"
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RECORDING STREAM INVARIANTS
    // ═══════════════════════════════════════════════════════════════════════════

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        /// INVARIANT: Compressed output never exceeds the raw input
        #[test]
        fn output_size_bounded(frame_count in 1usize..10) {
            let dir = tempdir().expect("tempdir");
            let output = dir.path().join("bounded.mp4");
            let pool = Arc::new(FramePool::new(16));
            let stream = RecordingStream::new(Arc::new(H264Backend::default()));
            stream.set_data_provider(pool.clone());
            stream
                .configure(StreamConfig::new(320, 240, 1_000_000, Some(output), false))
                .expect("configure");
            stream.start().expect("start");

            let raw_frame_size = 320 * 240 * 3 / 2;
            for i in 0..frame_count {
                pool.publish(Frame::from_data(flat_frame(320, 240, (i * 31) as u8), i as i64 * 33_000));
            }
            let stats = stream.stop().expect("stop").expect("was recording");

            prop_assert!(stats.bytes_written > 0, "Bytes written must be positive");
            prop_assert!(
                stats.bytes_written < (raw_frame_size * frame_count) as u64,
                "Compressed output ({} bytes) should be smaller than raw",
                stats.bytes_written
            );
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG INVARIANTS (no encoder required)
// ═══════════════════════════════════════════════════════════════════════════════

mod config_tests {
    use super::*;
    use crabcorder::recording::StreamConfig;

    proptest! {
        /// INVARIANT: Config preserves all set values
        #[test]
        fn config_preserves_values(
            width in 80u32..2048,
            height in 60u32..1080,
            fps in 1u32..120,
            bit_rate in 100_000u32..20_000_000,
        ) {
            let dir = tempdir().expect("tempdir");
            let config = StreamConfig::new(width * 2, height * 2, bit_rate, None, false)
                .with_frame_rate(fps)
                .with_output_directory(dir.path(), "CLIP");

            prop_assert_eq!(config.width, width * 2);
            prop_assert_eq!(config.height, height * 2);
            prop_assert_eq!(config.frame_rate, fps);
            prop_assert!(config.validate().is_ok());
            prop_assert_eq!(config.frame_interval_us(), (1000 / fps as i64) * 1000);
        }
    }
}
