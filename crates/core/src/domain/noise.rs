//! Colored-noise and texture generators
//!
//! Every generator produces one sample in [-1, 1] per call, seeded only by a
//! uniform random source. Constructors come in two flavors: `new()` seeds
//! from OS entropy, `from_seed()` takes a fixed seed so tests can assert
//! deterministic output.
//!
//! Color algorithms:
//! - White: raw uniform sample
//! - Pink: Paul Kellett's 7-pole recursive filter
//! - Brown: leaky integrator of white noise
//! - Blue: first difference of white noise
//! - Violet: second difference of white noise
//! - Gray: white noise weighted by an inverse-A-weighting-like curve
//!   evaluated at a pseudo-random frequency per sample (an approximation,
//!   not a certified A-weighting filter)
//!
//! Rain and nature textures are pre-rendered into a 2 second loop buffer
//! with short edge fades so the loop seam never clicks.

use crate::domain::settings::NoiseKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Length of the pre-rendered texture loop, seconds
const TEXTURE_LOOP_SECS: f32 = 2.0;

/// Linear fade applied at buffer boundaries, seconds
const EDGE_FADE_SECS: f32 = 0.010;

/// A lazy, restartable sequence of float samples in [-1, 1].
///
/// Both streaming generators and finite loop buffers satisfy this contract.
pub trait SampleSource: Send {
    /// Produce the next sample.
    fn next_sample(&mut self) -> f32;

    /// Restart the sequence. Seeded sources reproduce the same stream;
    /// buffers rewind to their first sample.
    fn reset(&mut self);
}

fn entropy_rng() -> StdRng {
    StdRng::from_entropy()
}

/// White noise: flat spectrum, raw uniform samples.
pub struct WhiteNoise {
    rng: StdRng,
    initial: StdRng,
}

impl WhiteNoise {
    pub fn new() -> Self {
        Self::with_rng(entropy_rng())
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            initial: rng.clone(),
            rng,
        }
    }
}

impl Default for WhiteNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for WhiteNoise {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        self.rng.gen_range(-1.0..=1.0)
    }

    fn reset(&mut self) {
        self.rng = self.initial.clone();
    }
}

/// Pink noise: 1/f spectrum via Paul Kellett's 7-pole recursive filter.
pub struct PinkNoise {
    white: WhiteNoise,
    // Running filter poles b0..b6
    b: [f32; 7],
}

impl PinkNoise {
    pub fn new() -> Self {
        Self {
            white: WhiteNoise::new(),
            b: [0.0; 7],
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            white: WhiteNoise::from_seed(seed),
            b: [0.0; 7],
        }
    }
}

impl Default for PinkNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for PinkNoise {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        let w = self.white.next_sample();
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + w * 0.0555179;
        b[1] = 0.99332 * b[1] + w * 0.0750759;
        b[2] = 0.96900 * b[2] + w * 0.1538520;
        b[3] = 0.86650 * b[3] + w * 0.3104856;
        b[4] = 0.55000 * b[4] + w * 0.5329522;
        b[5] = -0.7616 * b[5] - w * 0.0168980;
        let pink = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + w * 0.5362;
        b[6] = w * 0.115926;
        (pink * 0.11).clamp(-1.0, 1.0)
    }

    fn reset(&mut self) {
        self.white.reset();
        self.b = [0.0; 7];
    }
}

/// Brown noise: leaky integrator `y = (y + 0.02 * white) / 1.02`.
///
/// The leak term (0.02/1.02 < 1) bounds the random walk; the x3.5 gain
/// restores audible level.
pub struct BrownNoise {
    white: WhiteNoise,
    last: f32,
}

impl BrownNoise {
    pub fn new() -> Self {
        Self {
            white: WhiteNoise::new(),
            last: 0.0,
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            white: WhiteNoise::from_seed(seed),
            last: 0.0,
        }
    }
}

impl Default for BrownNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for BrownNoise {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        let w = self.white.next_sample();
        self.last = (self.last + 0.02 * w) / 1.02;
        (self.last * 3.5).clamp(-1.0, 1.0)
    }

    fn reset(&mut self) {
        self.white.reset();
        self.last = 0.0;
    }
}

/// Blue noise: first difference of white samples, emphasizing highs.
pub struct BlueNoise {
    white: WhiteNoise,
    prev: f32,
}

impl BlueNoise {
    pub fn new() -> Self {
        Self {
            white: WhiteNoise::new(),
            prev: 0.0,
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            white: WhiteNoise::from_seed(seed),
            prev: 0.0,
        }
    }
}

impl Default for BlueNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for BlueNoise {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        let w = self.white.next_sample();
        let out = (w - self.prev) * 0.5;
        self.prev = w;
        out
    }

    fn reset(&mut self) {
        self.white.reset();
        self.prev = 0.0;
    }
}

/// Violet noise: second difference of white samples.
pub struct VioletNoise {
    white: WhiteNoise,
    prev1: f32,
    prev2: f32,
}

impl VioletNoise {
    pub fn new() -> Self {
        Self {
            white: WhiteNoise::new(),
            prev1: 0.0,
            prev2: 0.0,
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            white: WhiteNoise::from_seed(seed),
            prev1: 0.0,
            prev2: 0.0,
        }
    }
}

impl Default for VioletNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for VioletNoise {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        let w = self.white.next_sample();
        let out = (w - 2.0 * self.prev1 + self.prev2) * 0.1;
        self.prev2 = self.prev1;
        self.prev1 = w;
        out.clamp(-1.0, 1.0)
    }

    fn reset(&mut self) {
        self.white.reset();
        self.prev1 = 0.0;
        self.prev2 = 0.0;
    }
}

/// A-weighting response in dB at frequency `f`, standard analytic form.
fn a_weighting_db(f: f32) -> f32 {
    let f2 = f * f;
    let ra = (12194.0_f32.powi(2) * f2 * f2)
        / ((f2 + 20.6_f32.powi(2))
            * ((f2 + 107.7_f32.powi(2)) * (f2 + 737.9_f32.powi(2))).sqrt()
            * (f2 + 12194.0_f32.powi(2)));
    20.0 * ra.log10() + 2.0
}

/// Gray noise: white noise weighted by an inverted loudness-sensitivity
/// curve, putting more energy where the ear is less sensitive.
pub struct GrayNoise {
    white: WhiteNoise,
    freq_rng: StdRng,
    freq_initial: StdRng,
}

impl GrayNoise {
    pub fn new() -> Self {
        Self::with_rngs(entropy_rng(), entropy_rng())
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::with_rngs(
            StdRng::seed_from_u64(seed),
            StdRng::seed_from_u64(seed.wrapping_add(0x9e3779b97f4a7c15)),
        )
    }

    fn with_rngs(white_rng: StdRng, freq_rng: StdRng) -> Self {
        Self {
            white: WhiteNoise::with_rng(white_rng),
            freq_initial: freq_rng.clone(),
            freq_rng,
        }
    }
}

impl Default for GrayNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for GrayNoise {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        let w = self.white.next_sample();
        let freq: f32 = self.freq_rng.gen_range(20.0..16000.0);
        // Invert the sensitivity curve: attenuated bands in A-weighting get
        // boosted here, clamped to keep the output well-behaved.
        let gain = 10.0_f32.powf(-a_weighting_db(freq) / 20.0).clamp(0.25, 4.0);
        (w * gain * 0.25).clamp(-1.0, 1.0)
    }

    fn reset(&mut self) {
        self.white.reset();
        self.freq_rng = self.freq_initial.clone();
    }
}

/// A finite block of pre-rendered samples, looped seamlessly.
///
/// Construction applies a short linear fade-in/out at the buffer edges to
/// eliminate discontinuity clicks at the loop seam.
pub struct NoiseBuffer {
    samples: Vec<f32>,
    position: usize,
}

impl NoiseBuffer {
    pub fn new(mut samples: Vec<f32>, sample_rate: f32) -> Self {
        apply_edge_fades(&mut samples, sample_rate);
        Self {
            samples,
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl SampleSource for NoiseBuffer {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let s = self.samples[self.position];
        self.position = (self.position + 1) % self.samples.len();
        s
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

fn apply_edge_fades(samples: &mut [f32], sample_rate: f32) {
    let fade = ((EDGE_FADE_SECS * sample_rate) as usize).min(samples.len() / 2);
    if fade == 0 {
        return;
    }
    for i in 0..fade {
        let g = i as f32 / fade as f32;
        samples[i] *= g;
        let j = samples.len() - 1 - i;
        samples[j] *= g;
    }
}

/// Parameters for one class of raindrop event.
struct DropClass {
    freq: (f32, f32),
    duration: (f32, f32),
    amplitude: (f32, f32),
    weight: f32,
}

const DROP_CLASSES: [DropClass; 3] = [
    // Small drops: high, short, quiet
    DropClass {
        freq: (4000.0, 8000.0),
        duration: (0.015, 0.04),
        amplitude: (0.08, 0.25),
        weight: 0.6,
    },
    // Medium drops
    DropClass {
        freq: (1000.0, 4000.0),
        duration: (0.04, 0.09),
        amplitude: (0.15, 0.4),
        weight: 0.3,
    },
    // Large drops: low, long, loud
    DropClass {
        freq: (300.0, 1000.0),
        duration: (0.08, 0.15),
        amplitude: (0.25, 0.55),
        weight: 0.1,
    },
];

fn pick_drop_class(rng: &mut StdRng) -> &'static DropClass {
    let total: f32 = DROP_CLASSES.iter().map(|c| c.weight).sum();
    let mut roll = rng.gen_range(0.0..total);
    for class in &DROP_CLASSES {
        if roll < class.weight {
            return class;
        }
        roll -= class.weight;
    }
    &DROP_CLASSES[0]
}

/// Render a rain texture into a loop buffer.
///
/// Additive synthesis of many short raindrop events, each with a two-stage
/// envelope (linear attack, quadratic decay) and three harmonically related
/// partials (f, 1.5f, 2f weighted 1, 0.5, 0.25), scattered with random gaps
/// across the loop, summed with a low-level background hiss and soft-clipped.
fn render_rain(sample_rate: f32, rng: &mut StdRng, mean_gap_secs: f32, level: f32) -> Vec<f32> {
    let len = (TEXTURE_LOOP_SECS * sample_rate) as usize;
    let mut out = vec![0.0_f32; len];

    // Background hiss bed
    for s in out.iter_mut() {
        *s += rng.gen_range(-1.0..=1.0) * 0.02;
    }

    let mut cursor = 0usize;
    while cursor < len {
        let gap = rng.gen_range(0.0..2.0 * mean_gap_secs);
        cursor += (gap * sample_rate) as usize + 1;
        if cursor >= len {
            break;
        }

        let class = pick_drop_class(rng);
        let freq = rng.gen_range(class.freq.0..class.freq.1);
        let duration = rng.gen_range(class.duration.0..class.duration.1);
        let amplitude = rng.gen_range(class.amplitude.0..class.amplitude.1) * level;

        let drop_len = ((duration * sample_rate) as usize).max(2);
        let attack_len = (drop_len / 6).max(1);
        let w = 2.0 * std::f32::consts::PI * freq / sample_rate;

        for i in 0..drop_len {
            let idx = cursor + i;
            if idx >= len {
                break;
            }
            let env = if i < attack_len {
                i as f32 / attack_len as f32
            } else {
                let u = (i - attack_len) as f32 / (drop_len - attack_len) as f32;
                (1.0 - u) * (1.0 - u)
            };
            let phase = w * i as f32;
            let partials = phase.sin() + 0.5 * (1.5 * phase).sin() + 0.25 * (2.0 * phase).sin();
            out[idx] += amplitude * env * partials / 1.75;
        }
    }

    for s in out.iter_mut() {
        *s = s.tanh();
    }

    out
}

/// Build the streaming generator for a noise color, or `None` for
/// [`NoiseKind::None`] and the texture kinds.
pub fn streaming(kind: NoiseKind, seed: Option<u64>) -> Option<Box<dyn SampleSource>> {
    let source: Box<dyn SampleSource> = match (kind, seed) {
        (NoiseKind::White, Some(s)) => Box::new(WhiteNoise::from_seed(s)),
        (NoiseKind::White, None) => Box::new(WhiteNoise::new()),
        (NoiseKind::Pink, Some(s)) => Box::new(PinkNoise::from_seed(s)),
        (NoiseKind::Pink, None) => Box::new(PinkNoise::new()),
        (NoiseKind::Brown, Some(s)) => Box::new(BrownNoise::from_seed(s)),
        (NoiseKind::Brown, None) => Box::new(BrownNoise::new()),
        (NoiseKind::Blue, Some(s)) => Box::new(BlueNoise::from_seed(s)),
        (NoiseKind::Blue, None) => Box::new(BlueNoise::new()),
        (NoiseKind::Violet, Some(s)) => Box::new(VioletNoise::from_seed(s)),
        (NoiseKind::Violet, None) => Box::new(VioletNoise::new()),
        (NoiseKind::Gray, Some(s)) => Box::new(GrayNoise::from_seed(s)),
        (NoiseKind::Gray, None) => Box::new(GrayNoise::new()),
        _ => return None,
    };
    Some(source)
}

/// Pre-render the loop buffer for a texture kind.
pub fn texture_buffer(kind: NoiseKind, sample_rate: f32, seed: Option<u64>) -> Option<NoiseBuffer> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => entropy_rng(),
    };
    let samples = match kind {
        NoiseKind::Rain => render_rain(sample_rate, &mut rng, 0.050, 1.0),
        // Same synthesis, sparser and softer
        NoiseKind::Nature => render_rain(sample_rate, &mut rng, 0.110, 0.6),
        _ => return None,
    };
    debug!(?kind, samples = samples.len(), "rendered texture loop");
    Some(NoiseBuffer::new(samples, sample_rate))
}

/// Build any background source: streaming generator for colors, loop buffer
/// for textures, `None` when no background layer is requested.
pub fn source_for(
    kind: NoiseKind,
    sample_rate: f32,
    seed: Option<u64>,
) -> Option<Box<dyn SampleSource>> {
    if kind.is_texture() {
        texture_buffer(kind, sample_rate, seed).map(|b| Box::new(b) as Box<dyn SampleSource>)
    } else {
        streaming(kind, seed)
    }
}
