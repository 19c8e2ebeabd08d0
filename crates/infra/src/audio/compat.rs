//! Host capability detection
//!
//! Probes the default CPAL host once and condenses the result into a
//! [`CompatibilityReport`] that the core layer consumes without ever
//! touching platform APIs itself.

use cpal::traits::{DeviceTrait, HostTrait};
use entrain_core::domain::audio::CompatibilityReport;
use tracing::{debug, info, warn};

/// Probe the default host and build a capability report.
///
/// Never fails: a machine with no audio output yields a report with
/// `has_output = false`, and the engine surfaces that at `initialize`.
pub fn detect() -> CompatibilityReport {
    let host = cpal::default_host();
    let engine_family = format!("cpal/{:?}", host.id()).to_lowercase();
    debug!(engine = %engine_family, "Probing audio host");

    let device = host.default_output_device();
    let Some(device) = device else {
        warn!("No default output device found");
        return CompatibilityReport {
            has_output: false,
            has_low_latency_path: false,
            has_channel_panning: false,
            has_dedicated_scheduling: false,
            sample_rate: 0,
            engine_family,
        };
    };

    let default_config = match device.default_output_config() {
        Ok(config) => config,
        Err(e) => {
            warn!("Output device has no usable configuration: {}", e);
            return CompatibilityReport {
                has_output: false,
                has_low_latency_path: false,
                has_channel_panning: false,
                has_dedicated_scheduling: false,
                sample_rate: 0,
                engine_family,
            };
        }
    };

    // f32 output means the callback can be fed per-sample frames directly;
    // anything else goes through the block-rate oscillator path.
    let has_low_latency_path = matches!(default_config.sample_format(), cpal::SampleFormat::F32);
    let has_channel_panning = default_config.channels() >= 2;

    let report = CompatibilityReport {
        has_output: true,
        has_low_latency_path,
        has_channel_panning,
        // CPAL drives every desktop host from a dedicated callback thread
        has_dedicated_scheduling: true,
        sample_rate: default_config.sample_rate(),
        engine_family,
    };

    info!(
        engine = %report.engine_family,
        sample_rate = report.sample_rate,
        low_latency = report.has_low_latency_path,
        "Audio capabilities detected"
    );
    report
}
