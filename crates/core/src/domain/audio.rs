//! Audio output abstractions and engine-wide domain models
//!
//! This module defines the core audio interfaces that are platform-agnostic.
//! Implementations for concrete hosts (cpal output streams, capability
//! probing) live in the `infra` crate.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur in the synthesis engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// No usable audio output path exists at all. Fatal to this engine
    /// instance; the caller decides how to surface it.
    #[error("Audio initialization failed: {0}")]
    AudioInit(String),

    /// Out-of-range frequency or volume. Rejected locally, prior valid
    /// state is retained.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any call after `destroy()`. Programmer error, surfaced immediately.
    #[error("Engine has been disposed")]
    EngineDisposed,

    /// Low-latency generation path requested but unsupported. Recovered
    /// internally by falling back to the oscillator path.
    #[error("Low-latency generation path unavailable: {0}")]
    GenerationPathUnavailable(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    Stream(String),

    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz96000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            96000 => SampleRate::Hz96000,
            hz => SampleRate::Custom(hz),
        }
    }
}

/// Configuration for the output stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sample_rate: SampleRate,
    pub channels: u16,
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

/// Which tone-generation strategy the signal graph should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationPath {
    /// Custom per-sample generation feeding directly into the graph
    LowLatency,
    /// Built-in oscillator primitives with block-rate parameter updates
    Oscillator,
}

/// Read-only snapshot of detected host audio capabilities.
///
/// Computed once per process by the infra layer and passed explicitly into
/// the signal graph manager's constructor; never mutated after detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// A real-time audio output path exists at all
    pub has_output: bool,
    /// Dedicated low-latency per-sample generation path is available
    pub has_low_latency_path: bool,
    /// True per-channel panning (vs. a positional-panner fallback)
    pub has_channel_panning: bool,
    /// Dedicated audio callback scheduling supported
    pub has_dedicated_scheduling: bool,
    /// Detected output sample rate in Hz
    pub sample_rate: u32,
    /// Host engine family, for diagnostics ("cpal/alsa", "cpal/coreaudio", ...)
    pub engine_family: String,
}

impl CompatibilityReport {
    /// A fully-capable report, useful for tests and offline rendering.
    pub fn full(sample_rate: u32) -> Self {
        Self {
            has_output: true,
            has_low_latency_path: true,
            has_channel_panning: true,
            has_dedicated_scheduling: true,
            sample_rate,
            engine_family: "test".to_string(),
        }
    }

    /// Which generation path the signal graph should select.
    pub fn preferred_path(&self) -> GenerationPath {
        if self.has_low_latency_path {
            GenerationPath::LowLatency
        } else {
            GenerationPath::Oscillator
        }
    }

    /// Human-readable descriptions of detected limitations, for a
    /// diagnostics panel in the consuming UI layer.
    pub fn limitations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.has_output {
            out.push("no real-time audio output path detected".to_string());
        }
        if !self.has_low_latency_path {
            out.push("low-latency per-sample generation unavailable".to_string());
        }
        if !self.has_channel_panning {
            out.push("per-channel panning unavailable, using positional fallback".to_string());
        }
        if !self.has_dedicated_scheduling {
            out.push("no dedicated audio callback scheduling".to_string());
        }
        out
    }

    /// Recommended fallbacks matching each limitation.
    pub fn recommended_fallbacks(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.has_low_latency_path {
            out.push("oscillator-based tone generation".to_string());
        }
        if !self.has_channel_panning {
            out.push("hard left/right channel assignment".to_string());
        }
        if !self.has_dedicated_scheduling {
            out.push("larger output buffer for scheduling headroom".to_string());
        }
        out
    }
}

/// Shared handle to the live renderer, read by the audio callback.
pub type RendererHandle = Arc<Mutex<crate::domain::graph::Renderer>>;

/// Trait for platform-agnostic audio output devices.
///
/// The signal graph manager acquires the device through this seam; the infra
/// crate provides the cpal implementation, tests provide mocks. Deliberately
/// not `Send`: host stream handles are thread-bound on several platforms, and
/// only the [`RendererHandle`] crosses into the audio callback thread.
pub trait AudioOutput {
    /// The stream configuration this output will run with
    fn config(&self) -> StreamConfig;

    /// Start the output stream, pulling interleaved stereo f32 frames from
    /// the renderer on the host's audio callback.
    fn start(&mut self, renderer: RendererHandle) -> Result<()>;

    /// Stop the output stream. Must be idempotent.
    fn stop(&mut self) -> Result<()>;
}
