//! Infrastructure layer: platform audio backends
//!
//! Implements the output and capability seams defined in `entrain-core`
//! against concrete hosts (CPAL today).

pub mod audio;
