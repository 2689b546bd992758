//! Frame scheduler: the single-threaded steady-state loop.
//!
//! One iteration: wait for the frame deadline (Idle), drain every whole audio
//! block into the spectrum texture (Capturing), hand the finished snapshot and
//! the elapsed time to the renderer and draw (Rendering), then colour-correct,
//! pack and submit the frame to the LED driver (Transmitting).
//!
//! All audio for a frame is ingested before the snapshot is taken, and the
//! snapshot is taken before the draw, so a render never sees a half-updated
//! band row. Cancellation is checked once per iteration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audio::spectrum::BYTES_PER_SAMPLE;
use crate::audio::{AudioSource, SpectrumError, SpectrumTexture};
use crate::config::LedConfig;
use crate::led::{ColorCorrection, LedDriver, TransmitError};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::render::{RenderError, Renderer};
use crate::state_machine::{FrameState, StateMachine};

/// Errors that end the frame loop.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("transmit failed: {0}")]
    Transmit(#[from] TransmitError),
    #[error("spectrum update failed: {0}")]
    Spectrum(#[from] SpectrumError),
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerOptions {
    /// Target frame period. Zero runs unpaced.
    pub frame_period: Duration,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

/// Totals for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frames: u64,
    pub audio_blocks: u64,
    pub capture_failures: u64,
}

/// Audio side of the loop: the device and the texture it feeds.
pub struct AudioInput {
    source: Box<dyn AudioSource>,
    spectrum: SpectrumTexture,
    block: Vec<u8>,
}

impl AudioInput {
    pub fn new(source: Box<dyn AudioSource>, spectrum: SpectrumTexture) -> Self {
        Self {
            block: vec![0; spectrum.block_bytes()],
            source,
            spectrum,
        }
    }

    pub fn spectrum(&self) -> &SpectrumTexture {
        &self.spectrum
    }
}

pub struct FrameScheduler<R, D> {
    renderer: R,
    driver: D,
    audio: Option<AudioInput>,
    correction: ColorCorrection,
    width: u32,
    height: u32,
    options: SchedulerOptions,
    state: StateMachine,
    metrics: Arc<MetricsRegistry>,
    led_words: Vec<u32>,
    report: FrameReport,
}

impl<R: Renderer, D: LedDriver> FrameScheduler<R, D> {
    pub fn new(
        led: &LedConfig,
        renderer: R,
        driver: D,
        audio: Option<AudioInput>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            renderer,
            driver,
            audio,
            correction: ColorCorrection::from_config(led),
            width: led.width,
            height: led.height,
            options,
            state: StateMachine::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            led_words: Vec::with_capacity(led.led_count()),
            report: FrameReport::default(),
        }
    }

    /// Run until `cancel` fires, the frame limit is reached, or a render or
    /// transmit fails.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<FrameReport, FrameError> {
        let started = Instant::now();
        let mut deadline = started;
        info!(
            width = self.width,
            height = self.height,
            audio = self.audio.is_some(),
            frame_period_ms = self.options.frame_period.as_millis() as u64,
            "frame loop started"
        );

        while !cancel.is_cancelled() {
            if self
                .options
                .max_frames
                .is_some_and(|max| self.report.frames >= max)
            {
                info!(frames = self.report.frames, "frame limit reached");
                break;
            }

            wait_until(deadline);
            deadline = next_deadline(deadline, self.options.frame_period);

            if let Err(e) = self.run_frame(started) {
                error!(error = %e, frame = self.report.frames, "frame loop aborted");
                self.state.cancel();
                return Err(e);
            }
        }

        self.state.cancel();
        info!(
            frames = self.report.frames,
            audio_blocks = self.report.audio_blocks,
            capture_failures = self.report.capture_failures,
            "frame loop stopped"
        );
        Ok(self.report)
    }

    fn run_frame(&mut self, started: Instant) -> Result<(), FrameError> {
        let frame_span = self.metrics.span(metric_names::FRAME_US);

        if self.audio.is_some() {
            enter(&self.state, FrameState::Capturing);
            let span = self.metrics.span(metric_names::CAPTURE_US);
            let blocks = self.drain_audio()?;
            span.finish();
            self.metrics
                .record(metric_names::BLOCKS_PER_FRAME, blocks as f64);
        }

        enter(&self.state, FrameState::Rendering);
        let span = self.metrics.span(metric_names::RENDER_US);
        if let Some(audio) = &self.audio {
            self.renderer.set_spectrum_texture(audio.spectrum.snapshot());
        }
        self.renderer.set_time(started.elapsed().as_secs_f32());
        let frame = self.renderer.draw()?;
        let expected = self.width as usize * self.height as usize * 3;
        if frame.len() != expected {
            return Err(RenderError::FrameSize {
                expected,
                actual: frame.len(),
            }
            .into());
        }
        span.finish();

        enter(&self.state, FrameState::Transmitting);
        let span = self.metrics.span(metric_names::TRANSMIT_US);
        self.correction.map_frame(frame, &mut self.led_words);
        self.driver
            .submit(&self.led_words, self.width, self.height)?;
        span.finish();

        enter(&self.state, FrameState::Idle);
        frame_span.finish();
        self.report.frames += 1;
        Ok(())
    }

    /// Ingest every whole block currently available. A failed read is
    /// replaced by a silent block and ends the drain for this frame.
    fn drain_audio(&mut self) -> Result<usize, SpectrumError> {
        let Some(audio) = self.audio.as_mut() else {
            return Ok(0);
        };
        let block_size = audio.spectrum.block_size();
        let mut blocks = 0;

        while audio.source.samples_available() >= block_size {
            match audio.source.read(&mut audio.block, block_size) {
                Ok(0) => break,
                Ok(written) => {
                    audio.block[written..].fill(0);
                    audio.spectrum.ingest(&audio.block, 1, BYTES_PER_SAMPLE)?;
                    blocks += 1;
                }
                Err(e) => {
                    warn!(error = %e, "capture failed, substituting silence");
                    audio.block.fill(0);
                    audio.spectrum.ingest(&audio.block, 1, BYTES_PER_SAMPLE)?;
                    blocks += 1;
                    self.report.capture_failures += 1;
                    self.metrics.record(metric_names::CAPTURE_FAILURES, 1.0);
                    break;
                }
            }
        }

        self.report.audio_blocks += blocks as u64;
        Ok(blocks)
    }

    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn audio(&self) -> Option<&AudioInput> {
        self.audio.as_ref()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn report(&self) -> FrameReport {
        self.report
    }
}

/// Transitions are fixed by `run_frame`; a rejection is a logic error and is
/// already logged by the state machine.
fn enter(state: &StateMachine, next: FrameState) {
    let _ = state.transition(next);
}

fn wait_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

/// Advance by one period; if the loop has fallen behind, restart the cadence
/// from now instead of bursting to catch up.
fn next_deadline(deadline: Instant, period: Duration) -> Instant {
    let next = deadline + period;
    let now = Instant::now();
    if next < now {
        now
    } else {
        next
    }
}
