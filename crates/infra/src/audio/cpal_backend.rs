//! CPAL-based audio output implementation
//!
//! Provides a cross-platform output stream using the CPAL library. The
//! stream callback pulls interleaved stereo frames straight from the shared
//! renderer; when the renderer lock is briefly held by the control side the
//! callback emits silence instead of stalling.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use entrain_core::domain::audio::{
    AudioOutput, EngineError, RendererHandle, Result, SampleRate, StreamConfig,
};
use entrain_core::domain::config::EngineConfig;
use std::fmt;
use tracing::{debug, error, info};

/// CPAL-backed output device
pub struct CpalOutput {
    device: cpal::Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Open the default output device, negotiating a stereo f32 stream as
    /// close as possible to the preferred sample rate.
    pub fn from_default_device(engine: &EngineConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::DeviceNotFound("No default output device".to_string()))?;
        Self::open(device, engine)
    }

    /// Open a named output device.
    pub fn from_device_name(name: &str, engine: &EngineConfig) -> Result<Self> {
        let host = cpal::default_host();
        #[allow(deprecated)]
        let device = host
            .devices()
            .map_err(|e| EngineError::Stream(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| EngineError::DeviceNotFound(name.to_string()))?;
        Self::open(device, engine)
    }

    /// List the names of all output-capable devices on the default host.
    pub fn output_device_names() -> Result<Vec<String>> {
        let host = cpal::default_host();
        #[allow(deprecated)]
        let devices = host
            .devices()
            .map_err(|e| EngineError::Stream(e.to_string()))?;

        let mut names = Vec::new();
        for device in devices {
            if device.supported_output_configs().is_ok() {
                if let Ok(name) = device.name() {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    fn open(device: cpal::Device, engine: &EngineConfig) -> Result<Self> {
        #[allow(deprecated)]
        let name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());

        let sample_rate = Self::negotiate_sample_rate(&device, engine.preferred_sample_rate)?;
        let config = StreamConfig {
            sample_rate: SampleRate::from_hz(sample_rate),
            channels: 2,
            buffer_size: engine.buffer_size,
        };

        info!(
            device = %name,
            sample_rate,
            buffer_size = engine.buffer_size,
            "Opened output device"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Pick the preferred sample rate when a stereo configuration covers
    /// it, otherwise fall back to the device default.
    fn negotiate_sample_rate(device: &cpal::Device, preferred: u32) -> Result<u32> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| EngineError::Stream(format!("Failed to query output configs: {}", e)))?;

        for range in supported {
            if range.channels() == 2
                && range.min_sample_rate() <= preferred
                && preferred <= range.max_sample_rate()
            {
                return Ok(preferred);
            }
        }

        let default_config = device
            .default_output_config()
            .map_err(|e| EngineError::Stream(format!("No default output config: {}", e)))?;
        if default_config.channels() < 2 {
            return Err(EngineError::Stream(
                "stereo output required for binaural presentation".to_string(),
            ));
        }

        let rate = default_config.sample_rate();
        debug!(
            preferred,
            negotiated = rate,
            "Preferred sample rate unsupported, using device default"
        );
        Ok(rate)
    }
}

impl AudioOutput for CpalOutput {
    fn config(&self) -> StreamConfig {
        self.config.clone()
    }

    fn start(&mut self, renderer: RendererHandle) -> Result<()> {
        if self.stream.is_some() {
            return Err(EngineError::Stream(
                "output stream already running".to_string(),
            ));
        }

        let cpal_config = CpalStreamConfig {
            channels: self.config.channels,
            sample_rate: self.config.sample_rate.hz(),
            buffer_size: cpal::BufferSize::Fixed(self.config.buffer_size),
        };

        let stream = self
            .device
            .build_output_stream(
                &cpal_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Never block the audio thread on the control side
                    match renderer.try_lock() {
                        Ok(mut r) => r.render(data),
                        Err(_) => data.fill(0.0),
                    }
                },
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| EngineError::Stream(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| EngineError::Stream(format!("Failed to start stream: {}", e)))?;

        debug!("Output stream started");
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| EngineError::Stream(format!("Failed to stop stream: {}", e)))?;
            debug!("Output stream stopped");
        }
        Ok(())
    }
}

impl fmt::Debug for CpalOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalOutput")
            .field("config", &self.config)
            .field("running", &self.stream.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_default_device() {
        match CpalOutput::from_default_device(&EngineConfig::default()) {
            Ok(output) => {
                let config = output.config();
                assert_eq!(config.channels, 2);
                assert!(config.sample_rate.hz() > 0);
            }
            Err(e) => {
                // On CI or headless systems there may be no audio device
                eprintln!("Skipping test: {}", e);
            }
        }
    }

    #[test]
    fn test_unknown_device_name() {
        let result =
            CpalOutput::from_device_name("definitely-not-a-device", &EngineConfig::default());
        assert!(matches!(
            result,
            Err(EngineError::DeviceNotFound(_)) | Err(EngineError::Stream(_))
        ));
    }

    #[test]
    fn test_stop_without_start_is_ok() {
        if let Ok(mut output) = CpalOutput::from_default_device(&EngineConfig::default()) {
            output.stop().unwrap();
            output.stop().unwrap();
        }
    }
}
