//! Engine settings value objects
//!
//! `AudioSettings` is an immutable snapshot: the signal graph manager never
//! mutates a settings value shared with callers, a new snapshot replaces the
//! old one on every update.

use crate::domain::audio::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Tone waveform for the oscillator path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// Background layer selection.
///
/// A closed variant set: adding a new noise color means adding one variant
/// plus one generator, not a string-keyed branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    #[default]
    None,
    White,
    Pink,
    Brown,
    Blue,
    Violet,
    Gray,
    Rain,
    Nature,
}

impl NoiseKind {
    pub fn is_none(&self) -> bool {
        matches!(self, NoiseKind::None)
    }

    /// Texture kinds are pre-rendered into a loop buffer; colors stream.
    pub fn is_texture(&self) -> bool {
        matches!(self, NoiseKind::Rain | NoiseKind::Nature)
    }
}

/// Immutable snapshot of everything the signal graph needs to build itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Carrier frequency for the left channel, Hz, must be > 0
    pub base_frequency: f32,
    /// Beat frequency; right channel runs at base + binaural, typically 0.5-40 Hz
    pub binaural_frequency: f32,
    /// Master volume, clamped to [0, 1]
    pub volume: f32,
    /// Mid-side width factor, clamped to [0, 1]
    pub stereo_width: f32,
    pub waveform: Waveform,
    pub background_noise: NoiseKind,
    /// Background layer volume, clamped to [0, 1]
    pub background_volume: f32,
    /// Slow sinusoidal wobble of both carrier frequencies
    pub frequency_modulation_enabled: bool,
    pub spatial_audio_enabled: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            base_frequency: 200.0,
            binaural_frequency: 10.0,
            volume: 0.5,
            stereo_width: 0.5,
            waveform: Waveform::Sine,
            background_noise: NoiseKind::None,
            background_volume: 0.3,
            frequency_modulation_enabled: false,
            spatial_audio_enabled: false,
        }
    }
}

/// Gain discipline for every [0, 1] field: out-of-range values clamp,
/// non-finite values collapse to silence instead of poisoning the graph.
pub(crate) fn clamp_gain(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl AudioSettings {
    /// Validate frequencies; gain-like fields are clamped, never rejected.
    pub fn validate(&self) -> Result<()> {
        if !self.base_frequency.is_finite() || self.base_frequency <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "base frequency must be positive, got {}",
                self.base_frequency
            )));
        }
        let right = self.base_frequency + self.binaural_frequency;
        if !right.is_finite() || right <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "right channel frequency must be positive, got {}",
                right
            )));
        }
        Ok(())
    }

    /// A copy with all gain-like fields clamped into [0, 1]; NaN and
    /// infinities become 0.
    pub fn clamped(&self) -> Self {
        Self {
            volume: clamp_gain(self.volume),
            stereo_width: clamp_gain(self.stereo_width),
            background_volume: clamp_gain(self.background_volume),
            ..self.clone()
        }
    }

    /// Target frequency of the right channel.
    pub fn right_frequency(&self) -> f32 {
        self.base_frequency + self.binaural_frequency
    }
}
