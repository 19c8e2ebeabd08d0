//! Entrain CLI Application

use anyhow::Context;
use clap::{Parser, Subcommand};
use entrain_core::domain::config::{ConfigManager, PresetManager};
use entrain_core::domain::graph::SignalGraphManager;
use entrain_core::domain::settings::{AudioSettings, NoiseKind, Waveform};
use entrain_infra::audio::{compat, CpalOutput};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "entrain")]
#[command(about = "A binaural beat and noise synthesis engine", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a binaural tone
    Play {
        /// Base (left channel) frequency in Hz
        #[arg(short, long, default_value_t = 200.0)]
        frequency: f32,

        /// Binaural beat frequency in Hz
        #[arg(short, long, default_value_t = 10.0)]
        beat: f32,

        /// Master volume, 0.0 to 1.0
        #[arg(long, default_value_t = 0.5)]
        volume: f32,

        /// Carrier waveform: sine, square, sawtooth, triangle
        #[arg(short, long, default_value = "sine")]
        waveform: String,

        /// Background noise: none, white, pink, brown, blue, violet, gray, rain, nature
        #[arg(short, long, default_value = "none")]
        noise: String,

        /// Background noise volume, 0.0 to 1.0
        #[arg(long, default_value_t = 0.3)]
        noise_volume: f32,

        /// Stereo width, 0.0 to 1.0
        #[arg(long, default_value_t = 0.5)]
        width: f32,

        /// Enable slow frequency modulation
        #[arg(long)]
        fm: bool,

        /// Enable spatial audio presentation
        #[arg(long)]
        spatial: bool,

        /// Play a saved preset instead of the flags above
        #[arg(short, long)]
        preset: Option<String>,

        /// Output device name (default device when omitted)
        #[arg(short, long)]
        device: Option<String>,

        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(long)]
        duration: Option<f32>,
    },

    /// List output devices
    Devices,

    /// Show detected host audio capabilities
    Compat,

    /// List saved presets
    Presets,

    /// Save the current config file settings as a named preset
    SavePreset { name: String },

    /// Delete a named preset
    DeletePreset { name: String },
}

fn parse_waveform(s: &str) -> anyhow::Result<Waveform> {
    match s.to_lowercase().as_str() {
        "sine" => Ok(Waveform::Sine),
        "square" => Ok(Waveform::Square),
        "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
        "triangle" | "tri" => Ok(Waveform::Triangle),
        other => anyhow::bail!("unknown waveform: {}", other),
    }
}

fn parse_noise(s: &str) -> anyhow::Result<NoiseKind> {
    match s.to_lowercase().as_str() {
        "none" => Ok(NoiseKind::None),
        "white" => Ok(NoiseKind::White),
        "pink" => Ok(NoiseKind::Pink),
        "brown" => Ok(NoiseKind::Brown),
        "blue" => Ok(NoiseKind::Blue),
        "violet" => Ok(NoiseKind::Violet),
        "gray" | "grey" => Ok(NoiseKind::Gray),
        "rain" => Ok(NoiseKind::Rain),
        "nature" => Ok(NoiseKind::Nature),
        other => anyhow::bail!("unknown noise kind: {}", other),
    }
}

fn preset_manager() -> anyhow::Result<(ConfigManager, PresetManager)> {
    let config_dir = ConfigManager::default_config_dir()?;
    let config_manager = ConfigManager::new(config_dir.clone());
    // Relative preset paths are resolved against the config directory
    let preset_dir = config_manager.load().engine.preset_dir;
    let preset_dir = if preset_dir.is_absolute() {
        preset_dir
    } else {
        config_dir.join(preset_dir)
    };
    Ok((config_manager, PresetManager::new(preset_dir)))
}

async fn run_play(
    settings: AudioSettings,
    device: Option<String>,
    duration: Option<f32>,
) -> anyhow::Result<()> {
    let (config_manager, _) = preset_manager()?;
    let config = config_manager.load();

    let output = match &device {
        Some(name) => CpalOutput::from_device_name(name, &config.engine)?,
        None => CpalOutput::from_default_device(&config.engine)?,
    };

    let report = compat::detect();
    for limitation in report.limitations() {
        tracing::warn!("Capability limitation: {}", limitation);
    }

    let mut engine = SignalGraphManager::new(Box::new(output), report, config.engine);
    engine.initialize()?;
    engine.start(&settings)?;

    tracing::info!(
        left_hz = settings.base_frequency,
        right_hz = settings.right_frequency(),
        beat_hz = settings.binaural_frequency,
        "Playing (Ctrl-C to stop)"
    );

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f32(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    engine.stop()?;
    engine.destroy()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Play {
            frequency,
            beat,
            volume,
            waveform,
            noise,
            noise_volume,
            width,
            fm,
            spatial,
            preset,
            device,
            duration,
        } => {
            let settings = match preset {
                Some(name) => {
                    let (_, presets) = preset_manager()?;
                    presets
                        .load_preset(&name)
                        .with_context(|| format!("loading preset '{}'", name))?
                }
                None => AudioSettings {
                    base_frequency: frequency,
                    binaural_frequency: beat,
                    volume,
                    stereo_width: width,
                    waveform: parse_waveform(&waveform)?,
                    background_noise: parse_noise(&noise)?,
                    background_volume: noise_volume,
                    frequency_modulation_enabled: fm,
                    spatial_audio_enabled: spatial,
                },
            };
            run_play(settings, device, duration).await?;
        }

        Commands::Devices => {
            for name in CpalOutput::output_device_names()? {
                println!("{}", name);
            }
        }

        Commands::Compat => {
            let report = compat::detect();
            println!("engine family:        {}", report.engine_family);
            println!("output available:     {}", report.has_output);
            println!("sample rate:          {} Hz", report.sample_rate);
            println!("preferred path:       {:?}", report.preferred_path());
            let limitations = report.limitations();
            if limitations.is_empty() {
                println!("limitations:          none");
            } else {
                for (limitation, fallback) in
                    limitations.iter().zip(report.recommended_fallbacks())
                {
                    println!("limitation:           {} -> {}", limitation, fallback);
                }
            }
        }

        Commands::Presets => {
            let (_, presets) = preset_manager()?;
            match presets.list_presets() {
                Ok(names) if names.is_empty() => println!("no presets saved"),
                Ok(names) => {
                    for name in names {
                        println!("{}", name);
                    }
                }
                Err(_) => println!("no presets saved"),
            }
        }

        Commands::SavePreset { name } => {
            let (config_manager, presets) = preset_manager()?;
            let config = config_manager.load();
            presets.save_preset(&name, &config.settings)?;
            println!("saved preset '{}'", name);
        }

        Commands::DeletePreset { name } => {
            let (_, presets) = preset_manager()?;
            presets.delete_preset(&name)?;
            println!("deleted preset '{}'", name);
        }
    }

    Ok(())
}
