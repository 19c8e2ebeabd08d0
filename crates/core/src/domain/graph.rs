//! Signal graph construction and lifecycle
//!
//! The [`SignalGraphManager`] owns the tone generators, gain automation,
//! crossfeed mix, background noise layer and mastering chain. It exposes the
//! engine's public operations (initialize/start/update*/stop/destroy) to the
//! consuming layer and never calls back into it.
//!
//! Tone generation is a strategy chosen once per `start` from the
//! [`CompatibilityReport`]: a low-latency per-sample path when the host
//! supports it, a portable oscillator path otherwise. Both produce the same
//! target frequencies and volume semantics; only latency and CPU
//! characteristics differ.

use crate::domain::audio::{
    AudioOutput, CompatibilityReport, EngineError, GenerationPath, RendererHandle, Result,
};
use crate::domain::automation::AutomationLane;
use crate::domain::config::EngineConfig;
use crate::domain::mastering::MasteringChain;
use crate::domain::noise::{self, SampleSource};
use crate::domain::settings::{clamp_gain, AudioSettings, Waveform};
use std::f32::consts::TAU;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Frequency-modulation LFO rate, Hz
const FM_RATE_HZ: f32 = 0.2;
/// Frequency-modulation depth, Hz
const FM_DEPTH_HZ: f32 = 0.5;
/// Crossfeed mix of the opposite channel
const CROSSFEED_MIX: f32 = 0.08;
/// Per-sample frequency glide time constant for the low-latency path, seconds
const GLIDE_SECS: f32 = 0.02;

/// Engine lifecycle state.
///
/// `Disposed` is terminal; every other transition is reversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Running,
    Disposed,
}

/// A mono tone stream at a controllable frequency.
///
/// The manager depends only on this abstraction; the concrete strategy is
/// selected once at `start` time.
pub trait ToneSource: Send {
    fn next_sample(&mut self) -> f32;

    /// Retarget the tone frequency. Takes effect at the implementation's
    /// safe boundary (per-sample glide or next block).
    fn set_frequency(&mut self, hz: f32);

    fn frequency(&self) -> f32;

    fn path(&self) -> GenerationPath;
}

#[inline]
fn eval_waveform(waveform: Waveform, phase: f32) -> f32 {
    let t = phase / TAU;
    match waveform {
        Waveform::Sine => phase.sin(),
        Waveform::Square => {
            if t < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => 2.0 * t - 1.0,
        Waveform::Triangle => {
            if t < 0.5 {
                4.0 * t - 1.0
            } else {
                3.0 - 4.0 * t
            }
        }
    }
}

/// Low-latency per-sample tone generation.
///
/// Frequency changes glide over ~20 ms per sample, and the optional FM
/// wobble is applied per sample as well.
pub struct LowLatencyTone {
    sample_rate: f32,
    waveform: Waveform,
    phase: f32,
    frequency: f32,
    target_frequency: f32,
    glide_coeff: f32,
    fm_enabled: bool,
    fm_phase: f32,
}

impl LowLatencyTone {
    pub fn new(sample_rate: f32, frequency: f32, waveform: Waveform, fm_enabled: bool) -> Self {
        Self {
            sample_rate,
            waveform,
            phase: 0.0,
            frequency,
            target_frequency: frequency,
            glide_coeff: 1.0 - (-1.0 / (GLIDE_SECS * sample_rate)).exp(),
            fm_enabled,
            fm_phase: 0.0,
        }
    }
}

impl ToneSource for LowLatencyTone {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        self.frequency += (self.target_frequency - self.frequency) * self.glide_coeff;

        let mut effective = self.frequency;
        if self.fm_enabled {
            effective += FM_DEPTH_HZ * self.fm_phase.sin();
            self.fm_phase = (self.fm_phase + TAU * FM_RATE_HZ / self.sample_rate) % TAU;
        }

        let out = eval_waveform(self.waveform, self.phase);
        self.phase = (self.phase + TAU * effective / self.sample_rate) % TAU;
        out
    }

    fn set_frequency(&mut self, hz: f32) {
        self.target_frequency = hz;
    }

    fn frequency(&self) -> f32 {
        self.target_frequency
    }

    fn path(&self) -> GenerationPath {
        GenerationPath::LowLatency
    }
}

/// Portable oscillator fallback.
///
/// A fixed-waveform phase accumulator with frequency updates applied at the
/// next block boundary, optionally modulated by a slow auxiliary oscillator
/// for frequency modulation.
pub struct OscillatorTone {
    sample_rate: f32,
    waveform: Waveform,
    phase: f32,
    frequency: f32,
    fm_enabled: bool,
    fm_phase: f32,
}

impl OscillatorTone {
    pub fn new(sample_rate: f32, frequency: f32, waveform: Waveform, fm_enabled: bool) -> Self {
        Self {
            sample_rate,
            waveform,
            phase: 0.0,
            frequency,
            fm_enabled,
            fm_phase: 0.0,
        }
    }
}

impl ToneSource for OscillatorTone {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        let mut effective = self.frequency;
        if self.fm_enabled {
            effective += FM_DEPTH_HZ * self.fm_phase.sin();
            self.fm_phase = (self.fm_phase + TAU * FM_RATE_HZ / self.sample_rate) % TAU;
        }

        let out = eval_waveform(self.waveform, self.phase);
        self.phase = (self.phase + TAU * effective / self.sample_rate) % TAU;
        out
    }

    fn set_frequency(&mut self, hz: f32) {
        self.frequency = hz;
    }

    fn frequency(&self) -> f32 {
        self.frequency
    }

    fn path(&self) -> GenerationPath {
        GenerationPath::Oscillator
    }
}

/// The live signal graph, evaluated on the audio callback.
///
/// Owns both tone sources (independent state per channel), the gain
/// automation lanes, the optional background source, and the mastering
/// chain. Frequency retargets are staged in `pending_frequencies` and
/// applied at the next render block boundary.
pub struct Renderer {
    time: u64,
    left: Box<dyn ToneSource>,
    right: Box<dyn ToneSource>,
    pending_frequencies: Option<(f32, f32)>,
    master_gain: AutomationLane,
    background_gain: AutomationLane,
    crossfeed: f32,
    background: Option<Box<dyn SampleSource>>,
    mastering: MasteringChain,
}

impl Renderer {
    /// Render one block of interleaved stereo frames.
    pub fn render(&mut self, buffer: &mut [f32]) {
        if let Some((left_hz, right_hz)) = self.pending_frequencies.take() {
            self.left.set_frequency(left_hz);
            self.right.set_frequency(right_hz);
        }

        for frame in buffer.chunks_exact_mut(2) {
            let (l, r) = self.render_frame();
            frame[0] = l;
            frame[1] = r;
        }
    }

    #[inline]
    fn render_frame(&mut self) -> (f32, f32) {
        let master = self.master_gain.value_at(self.time);
        let bg_gain = self.background_gain.value_at(self.time);
        self.time += 1;

        let tone_l = self.left.next_sample();
        let tone_r = self.right.next_sample();

        // Crossfeed softens the hard channel separation of pure binaural
        // presentation.
        let mut l = tone_l + self.crossfeed * tone_r;
        let mut r = tone_r + self.crossfeed * tone_l;

        if let Some(background) = self.background.as_mut() {
            let n = background.next_sample() * bg_gain;
            l += n;
            r += n;
        }

        self.mastering.process_frame(l * master, r * master)
    }

    /// Stage new channel frequencies for the next block boundary.
    pub fn set_pending_frequencies(&mut self, left_hz: f32, right_hz: f32) {
        self.pending_frequencies = Some((left_hz, right_hz));
    }

    pub fn schedule_master(&mut self, target: f32, ramp_samples: u64) {
        self.master_gain.schedule_ramp(self.time, target, ramp_samples);
    }

    pub fn schedule_background(&mut self, target: f32, ramp_samples: u64) {
        self.background_gain
            .schedule_ramp(self.time, target, ramp_samples);
    }

    pub fn set_masking_frequency(&mut self, hz: f32) {
        self.mastering.set_masking_frequency(hz);
    }

    pub fn master_target(&self) -> f32 {
        self.master_gain.target()
    }

    pub fn background_target(&self) -> f32 {
        self.background_gain.target()
    }

    /// Target frequencies of the two channels (pending retargets included).
    pub fn frequencies(&self) -> (f32, f32) {
        self.pending_frequencies
            .unwrap_or((self.left.frequency(), self.right.frequency()))
    }

    pub fn generation_path(&self) -> GenerationPath {
        self.left.path()
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    pub fn sample_time(&self) -> u64 {
        self.time
    }
}

/// Callback for non-fatal layer failures, reported instead of aborting
/// playback.
pub type DiagnosticFn = Box<dyn Fn(&str) + Send>;

/// Owns the signal graph and exposes the engine's public operations.
pub struct SignalGraphManager {
    state: EngineState,
    compat: CompatibilityReport,
    config: EngineConfig,
    output: Option<Box<dyn AudioOutput>>,
    sample_rate: f32,
    renderer: Option<RendererHandle>,
    settings: Option<AudioSettings>,
    diagnostics: Option<DiagnosticFn>,
}

impl SignalGraphManager {
    /// The compatibility report is detected once per process by the infra
    /// layer and injected here, so tests can substitute any capability mix.
    pub fn new(
        output: Box<dyn AudioOutput>,
        compat: CompatibilityReport,
        config: EngineConfig,
    ) -> Self {
        Self {
            state: EngineState::Uninitialized,
            compat,
            config,
            output: Some(output),
            sample_rate: 0.0,
            renderer: None,
            settings: None,
            diagnostics: None,
        }
    }

    /// Install a callback for non-fatal failures (e.g. background noise
    /// layer unavailable).
    pub fn with_diagnostics(mut self, callback: DiagnosticFn) -> Self {
        self.diagnostics = Some(callback);
        self
    }

    fn report(&self, message: &str) {
        warn!("{}", message);
        if let Some(cb) = &self.diagnostics {
            cb(message);
        }
    }

    fn guard_not_disposed(&self) -> Result<()> {
        if self.state == EngineState::Disposed {
            Err(EngineError::EngineDisposed)
        } else {
            Ok(())
        }
    }

    /// Acquire the audio output device and determine the sample rate.
    pub fn initialize(&mut self) -> Result<()> {
        self.guard_not_disposed()?;
        if self.state != EngineState::Uninitialized {
            return Ok(());
        }
        if !self.compat.has_output {
            return Err(EngineError::AudioInit(
                "no audio output path available".to_string(),
            ));
        }
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| EngineError::AudioInit("audio output already released".to_string()))?;
        self.sample_rate = output.config().sample_rate.hz() as f32;
        info!(
            sample_rate = self.sample_rate,
            engine = %self.compat.engine_family,
            "engine initialized"
        );
        self.state = EngineState::Initialized;
        Ok(())
    }

    /// Select the tone-source pair for the preferred generation path,
    /// falling back to the oscillator path when the low-latency one is
    /// unavailable. The fallback is recovered locally and never surfaces
    /// as a failure.
    fn build_tone_pair(
        &self,
        settings: &AudioSettings,
    ) -> (Box<dyn ToneSource>, Box<dyn ToneSource>) {
        let left_hz = settings.base_frequency;
        let right_hz = settings.right_frequency();
        match self.try_low_latency_pair(settings, left_hz, right_hz) {
            Ok(pair) => pair,
            Err(e) => {
                debug!("falling back to oscillator path: {}", e);
                (
                    Box::new(OscillatorTone::new(
                        self.sample_rate,
                        left_hz,
                        settings.waveform,
                        settings.frequency_modulation_enabled,
                    )),
                    Box::new(OscillatorTone::new(
                        self.sample_rate,
                        right_hz,
                        settings.waveform,
                        settings.frequency_modulation_enabled,
                    )),
                )
            }
        }
    }

    fn try_low_latency_pair(
        &self,
        settings: &AudioSettings,
        left_hz: f32,
        right_hz: f32,
    ) -> Result<(Box<dyn ToneSource>, Box<dyn ToneSource>)> {
        if !self.compat.has_low_latency_path {
            return Err(EngineError::GenerationPathUnavailable(
                "host offers only oscillator primitives".to_string(),
            ));
        }
        Ok((
            Box::new(LowLatencyTone::new(
                self.sample_rate,
                left_hz,
                settings.waveform,
                settings.frequency_modulation_enabled,
            )),
            Box::new(LowLatencyTone::new(
                self.sample_rate,
                right_hz,
                settings.waveform,
                settings.frequency_modulation_enabled,
            )),
        ))
    }

    /// Build the signal graph and start playback, fading the master gain
    /// from 0 to the target volume.
    pub fn start(&mut self, settings: &AudioSettings) -> Result<()> {
        self.guard_not_disposed()?;
        match self.state {
            EngineState::Uninitialized => {
                return Err(EngineError::AudioInit(
                    "initialize() has not been called".to_string(),
                ))
            }
            EngineState::Running => {
                return Err(EngineError::Stream(
                    "signal graph already running".to_string(),
                ))
            }
            _ => {}
        }

        settings.validate()?;
        let settings = settings.clamped();

        let (left, right) = self.build_tone_pair(&settings);
        debug!(
            path = ?left.path(),
            left_hz = settings.base_frequency,
            right_hz = settings.right_frequency(),
            "tone sources built"
        );

        let background = if settings.background_noise.is_none() {
            None
        } else {
            let source = noise::source_for(
                settings.background_noise,
                self.sample_rate,
                self.config.noise_seed,
            );
            if source.is_none() {
                self.report("background noise layer unavailable, continuing tone-only");
            }
            source
        };

        let fade_samples = (self.config.fade_secs * self.sample_rate) as u64;
        let mut master_gain = AutomationLane::new(0.0, 0.0, 1.0);
        master_gain.schedule_ramp(0, settings.volume, fade_samples);
        let mut background_gain = AutomationLane::new(0.0, 0.0, 1.0);
        background_gain.schedule_ramp(0, settings.background_volume, fade_samples);

        let crossfeed = if settings.spatial_audio_enabled {
            CROSSFEED_MIX * 2.0
        } else {
            CROSSFEED_MIX
        };

        let mut mastering = MasteringChain::new(self.sample_rate, settings.stereo_width);
        mastering.set_masking_frequency(settings.base_frequency);

        let renderer = Arc::new(Mutex::new(Renderer {
            time: 0,
            left,
            right,
            pending_frequencies: None,
            master_gain,
            background_gain,
            crossfeed,
            background,
            mastering,
        }));

        let output = self
            .output
            .as_mut()
            .ok_or_else(|| EngineError::Stream("audio output released".to_string()))?;
        if let Err(e) = output.start(Arc::clone(&renderer)) {
            // Construction failure must not require manual cleanup
            let _ = output.stop();
            return Err(e);
        }

        self.renderer = Some(renderer);
        self.settings = Some(settings);
        self.state = EngineState::Running;
        info!("playback started");
        Ok(())
    }

    /// Fade the master gain to 0, then release all generation nodes.
    /// Idempotent when already stopped.
    pub fn stop(&mut self) -> Result<()> {
        self.guard_not_disposed()?;
        if self.state != EngineState::Running {
            return Ok(());
        }

        let fade_samples = (self.config.fade_secs * self.sample_rate) as u64;
        if let Some(renderer) = &self.renderer {
            if let Ok(mut r) = renderer.lock() {
                r.schedule_master(0.0, fade_samples);
            }
        }
        if self.config.fade_secs > 0.0 {
            std::thread::sleep(Duration::from_secs_f32(self.config.fade_secs));
        }

        if let Some(output) = self.output.as_mut() {
            output.stop()?;
        }
        self.renderer = None;
        self.state = EngineState::Initialized;
        info!("playback stopped");
        Ok(())
    }

    /// Schedule the master gain to a new value; out-of-range values are
    /// clamped, never rejected.
    pub fn update_volume(&mut self, volume: f32) -> Result<()> {
        self.guard_not_disposed()?;
        let volume = clamp_gain(volume);
        let ramp = (self.config.update_ramp_secs * self.sample_rate) as u64;
        if let Some(renderer) = &self.renderer {
            if let Ok(mut r) = renderer.lock() {
                r.schedule_master(volume, ramp);
            }
        }
        if let Some(settings) = &mut self.settings {
            settings.volume = volume;
        }
        Ok(())
    }

    /// Schedule both channel frequencies to new values at the next block
    /// boundary. Invalid values are rejected without altering the running
    /// graph.
    pub fn update_frequency(&mut self, base: f32, binaural: f32) -> Result<()> {
        self.guard_not_disposed()?;
        if !base.is_finite() || base <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "base frequency must be positive, got {}",
                base
            )));
        }
        let right = base + binaural;
        if !right.is_finite() || right <= 0.0 {
            return Err(EngineError::InvalidParameter(format!(
                "right channel frequency must be positive, got {}",
                right
            )));
        }

        if let Some(renderer) = &self.renderer {
            if let Ok(mut r) = renderer.lock() {
                r.set_pending_frequencies(base, right);
                r.set_masking_frequency(base);
            }
        }
        if let Some(settings) = &mut self.settings {
            settings.base_frequency = base;
            settings.binaural_frequency = binaural;
        }
        Ok(())
    }

    /// Schedule the background layer gain; same discipline as the master.
    pub fn update_background_volume(&mut self, volume: f32) -> Result<()> {
        self.guard_not_disposed()?;
        let volume = clamp_gain(volume);
        let ramp = (self.config.update_ramp_secs * self.sample_rate) as u64;
        if let Some(renderer) = &self.renderer {
            if let Ok(mut r) = renderer.lock() {
                r.schedule_background(volume, ramp);
            }
        }
        if let Some(settings) = &mut self.settings {
            settings.background_volume = volume;
        }
        Ok(())
    }

    /// Stop playback if running and release the audio device. Terminal:
    /// every later call, a second `destroy` included, fails with
    /// [`EngineError::EngineDisposed`].
    pub fn destroy(&mut self) -> Result<()> {
        self.guard_not_disposed()?;
        if self.state == EngineState::Running {
            self.stop()?;
        }
        self.output = None;
        self.renderer = None;
        self.state = EngineState::Disposed;
        info!("engine disposed");
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Running
    }

    /// Snapshot of the settings the running graph was built from.
    pub fn current_settings(&self) -> Option<AudioSettings> {
        self.settings.clone()
    }

    pub fn compatibility(&self) -> &CompatibilityReport {
        &self.compat
    }

    /// Shared renderer handle, primarily for tests and offline rendering.
    pub fn renderer(&self) -> Option<RendererHandle> {
        self.renderer.as_ref().map(Arc::clone)
    }
}

impl Drop for SignalGraphManager {
    fn drop(&mut self) {
        if self.state == EngineState::Running {
            let _ = self.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audio::StreamConfig;
    use crate::domain::settings::NoiseKind;

    /// Output double that records calls without touching any device.
    struct MockOutput {
        started: bool,
    }

    impl MockOutput {
        fn boxed() -> Box<dyn AudioOutput> {
            Box::new(Self { started: false })
        }
    }

    impl AudioOutput for MockOutput {
        fn config(&self) -> StreamConfig {
            StreamConfig::default()
        }

        fn start(&mut self, _renderer: RendererHandle) -> crate::domain::audio::Result<()> {
            self.started = true;
            Ok(())
        }

        fn stop(&mut self) -> crate::domain::audio::Result<()> {
            self.started = false;
            Ok(())
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            fade_secs: 0.0,
            noise_seed: Some(1234),
            ..Default::default()
        }
    }

    fn manager_with(compat: CompatibilityReport) -> SignalGraphManager {
        SignalGraphManager::new(MockOutput::boxed(), compat, test_config())
    }

    fn running_manager() -> SignalGraphManager {
        let mut manager = manager_with(CompatibilityReport::full(48000));
        manager.initialize().unwrap();
        manager.start(&AudioSettings::default()).unwrap();
        manager
    }

    fn render_block(manager: &SignalGraphManager, frames: usize) -> Vec<f32> {
        let handle = manager.renderer().unwrap();
        let mut buf = vec![0.0; frames * 2];
        handle.lock().unwrap().render(&mut buf);
        buf
    }

    #[test]
    fn test_lifecycle_state_machine() {
        let mut manager = manager_with(CompatibilityReport::full(48000));
        assert_eq!(manager.state(), EngineState::Uninitialized);

        manager.initialize().unwrap();
        assert_eq!(manager.state(), EngineState::Initialized);

        manager.start(&AudioSettings::default()).unwrap();
        assert_eq!(manager.state(), EngineState::Running);
        assert!(manager.is_playing());

        manager.stop().unwrap();
        assert_eq!(manager.state(), EngineState::Initialized);

        manager.start(&AudioSettings::default()).unwrap();
        manager.destroy().unwrap();
        assert_eq!(manager.state(), EngineState::Disposed);
    }

    #[test]
    fn test_start_before_initialize_fails() {
        let mut manager = manager_with(CompatibilityReport::full(48000));
        assert!(matches!(
            manager.start(&AudioSettings::default()),
            Err(EngineError::AudioInit(_))
        ));
    }

    #[test]
    fn test_initialize_without_output_capability() {
        let mut compat = CompatibilityReport::full(48000);
        compat.has_output = false;
        let mut manager = manager_with(compat);
        assert!(matches!(
            manager.initialize(),
            Err(EngineError::AudioInit(_))
        ));
    }

    #[test]
    fn test_double_start_rejected() {
        let mut manager = running_manager();
        assert!(matches!(
            manager.start(&AudioSettings::default()),
            Err(EngineError::Stream(_))
        ));
        // Still running with the original graph
        assert!(manager.is_playing());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut manager = running_manager();
        manager.stop().unwrap();
        assert_eq!(manager.state(), EngineState::Initialized);
        manager.stop().unwrap();
        assert_eq!(manager.state(), EngineState::Initialized);
    }

    #[test]
    fn test_disposed_is_terminal() {
        let mut manager = running_manager();
        manager.destroy().unwrap();

        assert!(matches!(
            manager.initialize(),
            Err(EngineError::EngineDisposed)
        ));
        assert!(matches!(
            manager.start(&AudioSettings::default()),
            Err(EngineError::EngineDisposed)
        ));
        assert!(matches!(
            manager.update_volume(0.5),
            Err(EngineError::EngineDisposed)
        ));
        assert!(matches!(
            manager.stop(),
            Err(EngineError::EngineDisposed)
        ));
        assert!(matches!(
            manager.destroy(),
            Err(EngineError::EngineDisposed)
        ));
    }

    #[test]
    fn test_non_finite_gains_render_finite_output() {
        let mut manager = manager_with(CompatibilityReport::full(48000));
        manager.initialize().unwrap();
        manager
            .start(&AudioSettings {
                volume: f32::NAN,
                stereo_width: f32::INFINITY,
                background_noise: NoiseKind::Pink,
                background_volume: f32::NEG_INFINITY,
                ..Default::default()
            })
            .unwrap();

        let block = render_block(&manager, 512);
        assert!(
            block.iter().all(|s| s.is_finite()),
            "non-finite sample in output"
        );
        // NaN volume collapses to silence instead of poisoning the graph
        let handle = manager.renderer().unwrap();
        assert_eq!(handle.lock().unwrap().master_target(), 0.0);
    }

    #[test]
    fn test_channel_frequency_difference_is_beat() {
        let settings = AudioSettings {
            base_frequency: 200.0,
            binaural_frequency: 10.0,
            ..Default::default()
        };
        let mut manager = manager_with(CompatibilityReport::full(48000));
        manager.initialize().unwrap();
        manager.start(&settings).unwrap();

        let handle = manager.renderer().unwrap();
        let (left_hz, right_hz) = handle.lock().unwrap().frequencies();
        assert!((left_hz - 200.0).abs() < 1e-4);
        assert!((right_hz - 210.0).abs() < 1e-4);
        assert!(((right_hz - left_hz) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_oscillator_fallback_still_runs() {
        let mut compat = CompatibilityReport::full(48000);
        compat.has_low_latency_path = false;
        let mut manager = manager_with(compat);
        manager.initialize().unwrap();
        manager
            .start(&AudioSettings {
                base_frequency: 300.0,
                binaural_frequency: 6.0,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(manager.state(), EngineState::Running);
        let handle = manager.renderer().unwrap();
        let renderer = handle.lock().unwrap();
        assert_eq!(renderer.generation_path(), GenerationPath::Oscillator);
        let (left_hz, right_hz) = renderer.frequencies();
        assert!((left_hz - 300.0).abs() < 1e-4);
        assert!((right_hz - 306.0).abs() < 1e-4);
    }

    #[test]
    fn test_master_ramps_from_zero_to_volume() {
        let settings = AudioSettings {
            volume: 0.3,
            ..Default::default()
        };
        let mut manager = SignalGraphManager::new(
            MockOutput::boxed(),
            CompatibilityReport::full(48000),
            EngineConfig {
                fade_secs: 0.5,
                noise_seed: Some(1),
                ..Default::default()
            },
        );
        manager.initialize().unwrap();
        manager.start(&settings).unwrap();

        let handle = manager.renderer().unwrap();
        {
            let r = handle.lock().unwrap();
            assert!((r.master_target() - 0.3).abs() < 1e-6);
            assert!(!r.has_background());
        }

        // Early block is quiet, a block after the fade is louder
        let early = render_block(&manager, 512);
        let early_peak = early.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);
        // Skip ahead past the 0.5 s fade
        for _ in 0..50 {
            render_block(&manager, 512);
        }
        let late = render_block(&manager, 512);
        let late_peak = late.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);
        assert!(early_peak < late_peak);
    }

    #[test]
    fn test_update_volume_clamps_and_schedules() {
        let mut manager = running_manager();
        manager.update_volume(1.7).unwrap();
        let handle = manager.renderer().unwrap();
        assert!((handle.lock().unwrap().master_target() - 1.0).abs() < 1e-6);

        manager.update_volume(-0.5).unwrap();
        assert!(handle.lock().unwrap().master_target() < 1e-6);

        manager.update_volume(0.42).unwrap();
        assert!((handle.lock().unwrap().master_target() - 0.42).abs() < 1e-6);
        assert_eq!(manager.current_settings().unwrap().volume, 0.42);
    }

    #[test]
    fn test_update_frequency_rejects_invalid() {
        let mut manager = running_manager();
        assert!(manager.update_frequency(0.0, 10.0).is_err());
        assert!(manager.update_frequency(-5.0, 10.0).is_err());
        assert!(manager.update_frequency(5.0, -10.0).is_err());

        // Prior valid state retained
        let handle = manager.renderer().unwrap();
        let (left_hz, right_hz) = handle.lock().unwrap().frequencies();
        assert!((left_hz - 200.0).abs() < 1e-4);
        assert!((right_hz - 210.0).abs() < 1e-4);

        manager.update_frequency(440.0, 4.0).unwrap();
        let (left_hz, right_hz) = handle.lock().unwrap().frequencies();
        assert!((left_hz - 440.0).abs() < 1e-4);
        assert!((right_hz - 444.0).abs() < 1e-4);
    }

    #[test]
    fn test_background_source_created_for_noise() {
        let mut manager = manager_with(CompatibilityReport::full(48000));
        manager.initialize().unwrap();
        manager
            .start(&AudioSettings {
                background_noise: NoiseKind::Pink,
                background_volume: 0.4,
                ..Default::default()
            })
            .unwrap();
        let handle = manager.renderer().unwrap();
        let r = handle.lock().unwrap();
        assert!(r.has_background());
        assert!((r.background_target() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_rendered_output_stays_bounded() {
        let mut manager = manager_with(CompatibilityReport::full(48000));
        manager.initialize().unwrap();
        manager
            .start(&AudioSettings {
                volume: 1.0,
                background_noise: NoiseKind::Rain,
                background_volume: 1.0,
                stereo_width: 1.0,
                ..Default::default()
            })
            .unwrap();

        for _ in 0..100 {
            let block = render_block(&manager, 512);
            assert!(block.iter().all(|s| s.abs() <= 1.0));
        }
    }

    #[test]
    fn test_settings_snapshot_not_shared() {
        let mut manager = running_manager();
        let mut snapshot = manager.current_settings().unwrap();
        snapshot.volume = 0.99;
        // Mutating the caller's copy does not touch the engine
        assert_ne!(manager.current_settings().unwrap().volume, 0.99);
    }

    #[test]
    fn test_oscillator_and_low_latency_agree_on_frequency() {
        // Count zero crossings of one second of sine from each path
        fn crossings(tone: &mut dyn ToneSource, n: usize) -> usize {
            let mut prev = tone.next_sample();
            let mut count = 0;
            for _ in 1..n {
                let s = tone.next_sample();
                if prev <= 0.0 && s > 0.0 {
                    count += 1;
                }
                prev = s;
            }
            count
        }

        let sr = 48000.0;
        let mut low = LowLatencyTone::new(sr, 220.0, Waveform::Sine, false);
        let mut osc = OscillatorTone::new(sr, 220.0, Waveform::Sine, false);
        let a = crossings(&mut low, 48000);
        let b = crossings(&mut osc, 48000);
        assert!((a as i64 - 220).abs() <= 1, "low-latency: {}", a);
        assert!((b as i64 - 220).abs() <= 1, "oscillator: {}", b);
    }
}
