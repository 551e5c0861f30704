//! Testing utilities for crabcorder
//!
//! Synthetic camera images with realistic plane strides, and an in-memory
//! codec backend so the recording pipeline can run without an encoder.

pub mod loopback;
pub mod synthetic_data;

pub use loopback::{LoopbackBackend, LoopbackLog, MuxerEvent, ScriptedOutput};
pub use synthetic_data::{
    synthetic_packed_frame, synthetic_planar_image, synthetic_semiplanar_image, SyntheticImage,
};
