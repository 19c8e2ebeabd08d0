//! Mastering chain: compression, stereo widening, psychoacoustic shaping
//!
//! The merged tone + background signal passes through this chain before it
//! reaches the output device. Regardless of what upstream stages produce,
//! the final soft limiter guarantees no sample leaves the chain outside
//! [-1, 1].

use crate::domain::filter::{BiquadCoeffs, BiquadFilter, FilterType};

/// Compressor envelope attack time constant, seconds
const ATTACK_SECS: f32 = 0.003;
/// Compressor envelope release time constant, seconds
const RELEASE_SECS: f32 = 0.1;
/// Linear threshold above which gain reduction starts
const THRESHOLD: f32 = 0.7;
/// Compression ratio
const RATIO: f32 = 4.0;

/// Cross-channel delay length in samples at 44.1 kHz
const CROSSFEED_DELAY_44K: usize = 20;
/// Attenuation of the opposite channel fed into the delay
const CROSSFEED_LEVEL: f32 = 0.1;

/// Dynamic range compressor with a per-sample envelope follower.
///
/// `env += (|x| - env) * coeff` with distinct attack and release
/// coefficients; when the envelope exceeds the threshold, gain is reduced
/// toward the 4:1 ratio. Applied identically per channel, with independent
/// envelope state so the channels never pump each other.
#[derive(Debug, Clone)]
pub struct Compressor {
    attack_coeff: f32,
    release_coeff: f32,
    env_left: f32,
    env_right: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            attack_coeff: 1.0 - (-1.0 / (ATTACK_SECS * sample_rate)).exp(),
            release_coeff: 1.0 - (-1.0 / (RELEASE_SECS * sample_rate)).exp(),
            env_left: 0.0,
            env_right: 0.0,
        }
    }

    #[inline]
    fn gain_for(env: f32) -> f32 {
        if env > THRESHOLD {
            (THRESHOLD + (env - THRESHOLD) / RATIO) / env
        } else {
            1.0
        }
    }

    #[inline]
    fn follow(&self, env: f32, x: f32) -> f32 {
        let level = x.abs();
        let coeff = if level > env {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        env + (level - env) * coeff
    }

    /// Process one stereo frame.
    #[inline]
    pub fn process_frame(&mut self, l: f32, r: f32) -> (f32, f32) {
        self.env_left = self.follow(self.env_left, l);
        self.env_right = self.follow(self.env_right, r);
        (
            l * Self::gain_for(self.env_left),
            r * Self::gain_for(self.env_right),
        )
    }

    pub fn reset(&mut self) {
        self.env_left = 0.0;
        self.env_right = 0.0;
    }
}

/// Mid-side stereo widener with a short cross-channel delay.
///
/// Left/right are converted to mid `(L+R)/2` and side `(L-R)/2`, the side
/// signal is scaled by the width factor, and a few-hundred-microsecond tap
/// of the opposite channel (attenuated ~10%) is blended in before
/// reconstruction.
#[derive(Debug, Clone)]
pub struct StereoWidener {
    width: f32,
    delay_left: Vec<f32>,
    delay_right: Vec<f32>,
    pos: usize,
}

impl StereoWidener {
    pub fn new(sample_rate: f32, width: f32) -> Self {
        let delay_len =
            ((CROSSFEED_DELAY_44K as f32 * sample_rate / 44100.0).round() as usize).max(1);
        Self {
            width: width.clamp(0.0, 1.0),
            delay_left: vec![0.0; delay_len],
            delay_right: vec![0.0; delay_len],
            pos: 0,
        }
    }

    pub fn set_width(&mut self, width: f32) {
        self.width = width.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn process_frame(&mut self, l: f32, r: f32) -> (f32, f32) {
        let mid = (l + r) / 2.0;
        // Width 0.5 is the unity midpoint
        let side = (l - r) / 2.0 * (self.width * 2.0);

        let delayed_left = self.delay_left[self.pos];
        let delayed_right = self.delay_right[self.pos];
        self.delay_left[self.pos] = l * CROSSFEED_LEVEL;
        self.delay_right[self.pos] = r * CROSSFEED_LEVEL;
        self.pos = (self.pos + 1) % self.delay_left.len();

        (mid + side + delayed_right, mid - side + delayed_left)
    }

    pub fn reset(&mut self) {
        self.delay_left.fill(0.0);
        self.delay_right.fill(0.0);
        self.pos = 0;
    }
}

/// Threshold-in-quiet approximation in dB SPL at frequency `f` (Hz).
///
/// Simplified Bark-scale hearing threshold formula; an approximation for
/// perceptual gain staging, not a certified equal-loudness contour.
fn threshold_in_quiet_db(f: f32) -> f32 {
    let khz = (f / 1000.0).max(0.02);
    3.64 * khz.powf(-0.8) - 6.5 * (-0.6 * (khz - 3.3).powi(2)).exp() + 1e-3 * khz.powi(4)
}

/// Masking gain in [0.1, 1.0] for a tone at `frequency`.
pub fn masking_gain(frequency: f32) -> f32 {
    (1.0 - threshold_in_quiet_db(frequency) / 60.0).clamp(0.1, 1.0)
}

/// Psychoacoustic shelf/presence shaping with masking-curve attenuation.
///
/// A low shelf (~100 Hz), presence peak (~3 kHz) and high shelf (~8 kHz)
/// are chained per channel with independent filter state, then the output
/// is scaled by the masking gain for the current carrier frequency.
#[derive(Debug, Clone)]
pub struct PsychoShaper {
    left: [BiquadFilter; 3],
    right: [BiquadFilter; 3],
    masking: f32,
}

impl PsychoShaper {
    pub fn new(sample_rate: f32) -> Self {
        let coeffs = [
            BiquadCoeffs::new(FilterType::LowShelf, sample_rate, 100.0, 0.707, 2.0),
            BiquadCoeffs::new(FilterType::Peaking, sample_rate, 3000.0, 1.0, 3.0),
            BiquadCoeffs::new(FilterType::HighShelf, sample_rate, 8000.0, 0.707, 1.5),
        ];
        Self {
            left: coeffs.map(BiquadFilter::new),
            right: coeffs.map(BiquadFilter::new),
            masking: 1.0,
        }
    }

    /// Recompute the masking attenuation for a new carrier frequency.
    pub fn set_masking_frequency(&mut self, frequency: f32) {
        self.masking = masking_gain(frequency);
    }

    pub fn masking(&self) -> f32 {
        self.masking
    }

    #[inline]
    pub fn process_frame(&mut self, mut l: f32, mut r: f32) -> (f32, f32) {
        for f in self.left.iter_mut() {
            l = f.process(l);
        }
        for f in self.right.iter_mut() {
            r = f.process(r);
        }
        (l * self.masking, r * self.masking)
    }

    pub fn reset(&mut self) {
        for f in self.left.iter_mut().chain(self.right.iter_mut()) {
            f.reset();
        }
    }
}

/// Final safety stage: `tanh(x * 0.9) * 0.95`, so output never exceeds ±0.95.
#[inline]
pub fn soft_limit(x: f32) -> f32 {
    (x * 0.9).tanh() * 0.95
}

/// The full mastering chain: compressor → widener → shaping → limiter.
#[derive(Debug, Clone)]
pub struct MasteringChain {
    compressor: Compressor,
    widener: StereoWidener,
    shaper: PsychoShaper,
}

impl MasteringChain {
    pub fn new(sample_rate: f32, width: f32) -> Self {
        Self {
            compressor: Compressor::new(sample_rate),
            widener: StereoWidener::new(sample_rate, width),
            shaper: PsychoShaper::new(sample_rate),
        }
    }

    pub fn set_width(&mut self, width: f32) {
        self.widener.set_width(width);
    }

    pub fn set_masking_frequency(&mut self, frequency: f32) {
        self.shaper.set_masking_frequency(frequency);
    }

    /// Process one stereo frame through the whole chain. Output is always
    /// within [-1, 1] regardless of input.
    #[inline]
    pub fn process_frame(&mut self, l: f32, r: f32) -> (f32, f32) {
        let (l, r) = self.compressor.process_frame(l, r);
        let (l, r) = self.widener.process_frame(l, r);
        let (l, r) = self.shaper.process_frame(l, r);
        (soft_limit(l), soft_limit(r))
    }

    pub fn reset(&mut self) {
        self.compressor.reset();
        self.widener.reset();
        self.shaper.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::noise::{PinkNoise, SampleSource};

    const SAMPLE_RATE: f32 = 44100.0;

    #[test]
    fn test_compressor_unity_below_threshold() {
        let mut comp = Compressor::new(SAMPLE_RATE);
        // Feed a quiet steady signal; envelope settles well below threshold
        let mut out = 0.0;
        for _ in 0..10000 {
            out = comp.process_frame(0.3, 0.3).0;
        }
        assert!((out - 0.3).abs() < 1e-3);
    }

    #[test]
    fn test_compressor_reduces_loud_signal() {
        let mut comp = Compressor::new(SAMPLE_RATE);
        let mut out = 0.0;
        for _ in 0..10000 {
            out = comp.process_frame(0.95, 0.95).0;
        }
        // env -> 0.95, gain -> (0.7 + 0.25/4)/0.95
        let expected = (THRESHOLD + (0.95 - THRESHOLD) / RATIO) / 0.95 * 0.95;
        assert!((out - expected).abs() < 1e-2);
        assert!(out < 0.95);
    }

    #[test]
    fn test_compressor_channels_independent() {
        let mut comp = Compressor::new(SAMPLE_RATE);
        let mut frame = (0.0, 0.0);
        for _ in 0..10000 {
            frame = comp.process_frame(0.95, 0.2);
        }
        assert!(frame.0 < 0.9);
        assert!((frame.1 - 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_widener_zero_width_collapses_to_mid() {
        let mut widener = StereoWidener::new(SAMPLE_RATE, 0.0);
        // Run past the delay line so the cross taps are steady
        let mut frame = (0.0, 0.0);
        for _ in 0..100 {
            frame = widener.process_frame(0.8, 0.2);
        }
        // Both channels converge to mid plus the opposite cross tap
        let mid = 0.5;
        assert!((frame.0 - (mid + 0.2 * CROSSFEED_LEVEL)).abs() < 1e-4);
        assert!((frame.1 - (mid + 0.8 * CROSSFEED_LEVEL)).abs() < 1e-4);
    }

    #[test]
    fn test_widener_width_expands_side() {
        let mut narrow = StereoWidener::new(SAMPLE_RATE, 0.25);
        let mut wide = StereoWidener::new(SAMPLE_RATE, 1.0);
        let mut n = (0.0, 0.0);
        let mut w = (0.0, 0.0);
        for _ in 0..100 {
            n = narrow.process_frame(0.8, 0.2);
            w = wide.process_frame(0.8, 0.2);
        }
        assert!((w.0 - w.1).abs() > (n.0 - n.1).abs());
    }

    #[test]
    fn test_masking_gain_range() {
        for f in [20.0, 100.0, 440.0, 1000.0, 3000.0, 8000.0, 16000.0] {
            let g = masking_gain(f);
            assert!((0.1..=1.0).contains(&g), "gain {} at {} Hz", g, f);
        }
        // The ear is most sensitive near the presence region; low carriers
        // get attenuated harder
        assert!(masking_gain(3000.0) > masking_gain(40.0));
    }

    #[test]
    fn test_soft_limit_bounds() {
        for x in [-1000.0, -10.0, -1.0, 0.0, 1.0, 10.0, 1000.0_f32] {
            let y = soft_limit(x);
            assert!(y.abs() <= 0.95);
        }
        assert_eq!(soft_limit(0.0), 0.0);
    }

    #[test]
    fn test_chain_output_bounded_for_pink_noise() {
        // 10 seconds of continuous pink noise through the full chain
        let mut chain = MasteringChain::new(SAMPLE_RATE, 0.8);
        chain.set_masking_frequency(200.0);
        let mut pink_l = PinkNoise::from_seed(1);
        let mut pink_r = PinkNoise::from_seed(2);
        for _ in 0..(10.0 * SAMPLE_RATE) as usize {
            let (l, r) = chain.process_frame(
                pink_l.next_sample() * 2.0,
                pink_r.next_sample() * 2.0,
            );
            assert!(l.abs() <= 1.0 && r.abs() <= 1.0);
        }
    }

    #[test]
    fn test_chain_reset() {
        let mut chain = MasteringChain::new(SAMPLE_RATE, 0.5);
        for _ in 0..1000 {
            chain.process_frame(0.9, -0.9);
        }
        chain.reset();
        // After reset, silence in -> silence out (limiter of 0 is 0)
        let (l, r) = chain.process_frame(0.0, 0.0);
        assert!(l.abs() < 1e-6 && r.abs() < 1e-6);
    }
}
