//! Domain entities and business rules

pub mod audio;
pub mod automation;
pub mod config;
pub mod filter;
pub mod graph;
pub mod mastering;
pub mod noise;
pub mod settings;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioOutput, CompatibilityReport, EngineError, GenerationPath, Result, SampleRate,
    StreamConfig,
};
pub use automation::{AutomationEvent, AutomationLane};
pub use config::{ConfigError, ConfigManager, EngineConfig, EntrainConfig, PresetManager};
pub use filter::{BiquadCoeffs, BiquadFilter, FilterType};
pub use graph::{EngineState, Renderer, SignalGraphManager};
pub use mastering::{Compressor, MasteringChain, PsychoShaper, StereoWidener};
pub use noise::{NoiseBuffer, SampleSource};
pub use settings::{AudioSettings, NoiseKind, Waveform};
