//! entrain-core: platform-agnostic binaural beat synthesis engine
//!
//! This crate contains the pure signal-processing core: biquad filters,
//! colored-noise and texture generators, the mastering chain, parameter
//! automation, and the signal graph manager. Host integration (cpal devices,
//! capability probing) lives in `entrain-infra`.

pub mod domain;
