//! OpenGLED: drives an addressable LED matrix from a rendered frame,
//! optionally modulated by live audio.
//! Main library: tracing setup, config loading, collaborator wiring and the
//! frame loop.

pub mod audio;
pub mod cancellation;
pub mod cli;
pub mod config;
pub mod led;
pub mod metrics;
pub mod render;
pub mod scheduler;
pub mod state_machine;

use anyhow::Context;
use tracing::{info, warn};

use audio::{CpalSource, SpectrumTexture};
use cancellation::ShutdownSignal;
use cli::Args;
use config::{AppConfig, PipelineConfig};
use led::{LedDriver, PngDumpDriver, TraceDriver};
use render::SpectrumBarsRenderer;
use scheduler::{AudioInput, FrameScheduler, SchedulerOptions};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("opengled=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Open the capture device and build the spectrum texture. A missing or
/// failing device disables audio rather than aborting.
fn start_audio(config: &PipelineConfig) -> anyhow::Result<Option<AudioInput>> {
    let Some(audio) = &config.audio else {
        return Ok(None);
    };
    let spectrum = SpectrumTexture::from_config(audio).context("invalid band configuration")?;
    match CpalSource::open(audio) {
        Ok(source) => {
            info!(
                bands = audio.bands.len(),
                history = audio.history_length,
                block_size = audio.block_size,
                "audio pipeline started"
            );
            Ok(Some(AudioInput::new(Box::new(source), spectrum)))
        }
        Err(e) => {
            warn!(error = %e, "audio pipeline failed to start (may not have mic access), running without audio");
            Ok(None)
        }
    }
}

/// Load config, wire the collaborators and run the frame loop until
/// shutdown.
pub fn run(args: Args) -> anyhow::Result<()> {
    init_tracing(args.log_json);
    info!(config = %args.config.display(), "opengled starting");

    let mut config = AppConfig::load_from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?
        .validate()
        .context("invalid configuration")?;
    if args.no_audio {
        config.audio = None;
    }
    info!(
        width = config.led.width,
        height = config.led.height,
        gpio_pin = config.led.gpio_pin,
        dma = config.led.dma,
        brightness = config.led.brightness,
        "config_loaded"
    );

    let shutdown = ShutdownSignal::new();
    shutdown
        .install_handler()
        .context("failed to install signal handler")?;

    let audio = start_audio(&config)?;
    let renderer = SpectrumBarsRenderer::new(config.led.width, config.led.height);
    let driver: Box<dyn LedDriver> = match &args.dump_png {
        Some(path) => Box::new(PngDumpDriver::new(path)),
        None => Box::new(TraceDriver::from_config(&config.led)),
    };

    let options = SchedulerOptions {
        frame_period: config.frame_period,
        max_frames: args.frames,
    };
    let mut scheduler = FrameScheduler::new(&config.led, renderer, driver, audio, options);
    let result = scheduler.run(&shutdown.token());

    for (name, summary) in scheduler.metrics().summary() {
        info!(
            metric = %name,
            p50 = summary.p50,
            p95 = summary.p95,
            p99 = summary.p99,
            count = summary.count,
            "frame_timing"
        );
    }

    let report = result.context("frame loop failed")?;
    info!(frames = report.frames, "opengled stopped");
    Ok(())
}
