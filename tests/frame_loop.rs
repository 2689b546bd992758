//! Frame loop behaviour against scripted audio, renderer and LED fakes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::rc::Rc;
use std::time::{Duration, Instant};

use opengled::audio::spectrum::BYTES_PER_SAMPLE;
use opengled::audio::{AudioSource, CaptureError, SpectrumMatrix, SpectrumTexture};
use opengled::config::{BandSpec, LedConfig};
use opengled::led::{LedDriver, TransmitError};
use opengled::render::{RenderError, Renderer};
use opengled::scheduler::{AudioInput, FrameError, FrameScheduler, SchedulerOptions};
use opengled::state_machine::FrameState;
use tokio_util::sync::CancellationToken;

const WIDTH: u32 = 4;
const HEIGHT: u32 = 2;
const SAMPLE_RATE: u32 = 8000;
const BLOCK: usize = 64;
const HISTORY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Read,
    SetTexture(SpectrumMatrix),
    SetTime(f32),
    Draw,
    Submit(Vec<u32>),
}

type Log = Rc<RefCell<Vec<Event>>>;

struct ScriptedSource {
    log: Log,
    reads: VecDeque<Result<Vec<i16>, CaptureError>>,
}

impl AudioSource for ScriptedSource {
    fn samples_available(&self) -> usize {
        self.reads.len() * BLOCK
    }

    fn read(&mut self, buffer: &mut [u8], block_size: usize) -> Result<usize, CaptureError> {
        assert_eq!(block_size, BLOCK);
        self.log.borrow_mut().push(Event::Read);
        let samples = self.reads.pop_front().unwrap_or_else(|| Ok(Vec::new()))?;
        for (chunk, s) in buffer.chunks_exact_mut(BYTES_PER_SAMPLE).zip(&samples) {
            chunk.copy_from_slice(&s.to_le_bytes());
        }
        Ok(samples.len() * BYTES_PER_SAMPLE)
    }
}

struct RecordingRenderer {
    log: Log,
    frame: Vec<u8>,
}

impl RecordingRenderer {
    fn new(log: &Log, pixel: [u8; 3]) -> Self {
        Self::with_len(log, pixel, (WIDTH * HEIGHT) as usize)
    }

    fn with_len(log: &Log, pixel: [u8; 3], pixels: usize) -> Self {
        Self {
            log: log.clone(),
            frame: pixel.repeat(pixels),
        }
    }
}

impl Renderer for RecordingRenderer {
    fn set_spectrum_texture(&mut self, matrix: &SpectrumMatrix) {
        self.log
            .borrow_mut()
            .push(Event::SetTexture(matrix.clone()));
    }

    fn set_time(&mut self, seconds: f32) {
        self.log.borrow_mut().push(Event::SetTime(seconds));
    }

    fn draw(&mut self) -> Result<&[u8], RenderError> {
        self.log.borrow_mut().push(Event::Draw);
        Ok(&self.frame)
    }
}

struct RecordingDriver {
    log: Log,
    fail: bool,
    /// Cancel this token during the n-th submit (1-based).
    cancel_on: Option<(usize, CancellationToken)>,
    submits: usize,
}

impl RecordingDriver {
    fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            fail: false,
            cancel_on: None,
            submits: 0,
        }
    }
}

impl LedDriver for RecordingDriver {
    fn submit(&mut self, frame: &[u32], width: u32, height: u32) -> Result<(), TransmitError> {
        assert_eq!((width, height), (WIDTH, HEIGHT));
        if self.fail {
            return Err(TransmitError::Write("bus unplugged".into()));
        }
        self.submits += 1;
        if let Some((n, token)) = &self.cancel_on {
            if *n == self.submits {
                token.cancel();
            }
        }
        self.log.borrow_mut().push(Event::Submit(frame.to_vec()));
        Ok(())
    }
}

fn led_config() -> LedConfig {
    LedConfig {
        gpio_pin: 12,
        dma: 10,
        width: WIDTH,
        height: HEIGHT,
        brightness: 255,
        gamma: 1.0,
    }
}

fn texture() -> SpectrumTexture {
    let bands = [
        BandSpec::from_cutoffs(100.0, 300.0),
        BandSpec::from_cutoffs(300.0, 1000.0),
        BandSpec::from_cutoffs(1000.0, 3000.0),
    ];
    SpectrumTexture::configure(&bands, HISTORY, SAMPLE_RATE, BLOCK, 1.0).unwrap()
}

fn sine_block(freq: f64, amplitude: f64, offset: usize) -> Vec<i16> {
    (0..BLOCK)
        .map(|i| {
            let t = (offset + i) as f64 / SAMPLE_RATE as f64;
            (amplitude * 32767.0 * (2.0 * PI * freq * t).sin()) as i16
        })
        .collect()
}

fn to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    bytes.resize(BLOCK * BYTES_PER_SAMPLE, 0);
    bytes
}

fn audio_input(log: &Log, reads: Vec<Result<Vec<i16>, CaptureError>>) -> AudioInput {
    let source = ScriptedSource {
        log: log.clone(),
        reads: reads.into(),
    };
    AudioInput::new(Box::new(source), texture())
}

fn options(max_frames: u64) -> SchedulerOptions {
    SchedulerOptions {
        frame_period: Duration::ZERO,
        max_frames: Some(max_frames),
    }
}

fn kinds(log: &Log) -> Vec<&'static str> {
    log.borrow()
        .iter()
        .map(|e| match e {
            Event::Read => "read",
            Event::SetTexture(_) => "texture",
            Event::SetTime(_) => "time",
            Event::Draw => "draw",
            Event::Submit(_) => "submit",
        })
        .collect()
}

fn textures(log: &Log) -> Vec<SpectrumMatrix> {
    log.borrow()
        .iter()
        .filter_map(|e| match e {
            Event::SetTexture(m) => Some(m.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_audio_drained_before_snapshot_and_draw() {
    let log = Log::default();
    let blocks = vec![
        Ok(sine_block(200.0, 0.8, 0)),
        Ok(sine_block(200.0, 0.8, BLOCK)),
        Ok(sine_block(2000.0, 0.5, 2 * BLOCK)),
    ];
    let audio = audio_input(&log, blocks);
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [1, 2, 3]),
        RecordingDriver::new(&log),
        Some(audio),
        options(1),
    );

    let report = scheduler.run(&CancellationToken::new()).unwrap();

    assert_eq!(report.frames, 1);
    assert_eq!(report.audio_blocks, 3);
    assert_eq!(
        kinds(&log),
        vec!["read", "read", "read", "texture", "time", "draw", "submit"]
    );
}

#[test]
fn test_snapshot_matches_reference_texture() {
    let log = Log::default();
    let blocks: Vec<Vec<i16>> = (0..5)
        .map(|i| sine_block(if i % 2 == 0 { 200.0 } else { 1500.0 }, 0.6, i * BLOCK))
        .collect();
    let audio = audio_input(&log, blocks.iter().cloned().map(Ok).collect());
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [0, 0, 0]),
        RecordingDriver::new(&log),
        Some(audio),
        options(1),
    );
    scheduler.run(&CancellationToken::new()).unwrap();

    let mut reference = texture();
    for block in &blocks {
        reference.ingest(&to_bytes(block), 1, BYTES_PER_SAMPLE).unwrap();
    }

    let seen = textures(&log);
    assert_eq!(seen.len(), 1);
    assert_eq!(&seen[0], reference.snapshot());
    assert_eq!(scheduler.audio().unwrap().spectrum().snapshot(), reference.snapshot());
    // low band saw the 200 Hz blocks
    assert!(seen[0].row(0).iter().any(|&v| v > 0));
}

#[test]
fn test_audio_disabled_never_sets_texture() {
    let log = Log::default();
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [9, 9, 9]),
        RecordingDriver::new(&log),
        None,
        options(3),
    );

    let report = scheduler.run(&CancellationToken::new()).unwrap();

    assert_eq!(report.frames, 3);
    assert_eq!(report.audio_blocks, 0);
    assert!(textures(&log).is_empty());
    assert_eq!(
        kinds(&log),
        ["time", "draw", "submit"].repeat(3)
    );
}

#[test]
fn test_capture_error_substitutes_silence_and_ends_drain() {
    let log = Log::default();
    let loud = sine_block(200.0, 0.9, 0);
    let reads = vec![
        Ok(loud.clone()),
        Err(CaptureError::Stream("overrun".into())),
        Ok(loud.clone()),
    ];
    let audio = audio_input(&log, reads);
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [0, 0, 0]),
        RecordingDriver::new(&log),
        Some(audio),
        options(2),
    );

    let report = scheduler.run(&CancellationToken::new()).unwrap();

    assert_eq!(report.frames, 2);
    assert_eq!(report.capture_failures, 1);
    assert_eq!(report.audio_blocks, 3);
    assert_eq!(
        kinds(&log),
        vec![
            "read", "read", "texture", "time", "draw", "submit", //
            "read", "texture", "time", "draw", "submit",
        ]
    );

    let mut reference = texture();
    reference.ingest(&to_bytes(&loud), 1, BYTES_PER_SAMPLE).unwrap();
    reference.ingest(&to_bytes(&[]), 1, BYTES_PER_SAMPLE).unwrap();
    assert_eq!(&textures(&log)[0], reference.snapshot());
}

#[test]
fn test_short_read_is_zero_padded() {
    let log = Log::default();
    let half = sine_block(200.0, 0.9, 0)[..BLOCK / 2].to_vec();
    let audio = audio_input(&log, vec![Ok(half.clone())]);
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [0, 0, 0]),
        RecordingDriver::new(&log),
        Some(audio),
        options(1),
    );
    scheduler.run(&CancellationToken::new()).unwrap();

    let mut reference = texture();
    reference.ingest(&to_bytes(&half), 1, BYTES_PER_SAMPLE).unwrap();
    assert_eq!(&textures(&log)[0], reference.snapshot());
}

#[test]
fn test_transmit_error_stops_loop() {
    let log = Log::default();
    let mut driver = RecordingDriver::new(&log);
    driver.fail = true;
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [5, 5, 5]),
        driver,
        None,
        options(10),
    );

    let result = scheduler.run(&CancellationToken::new());

    assert!(matches!(
        result,
        Err(FrameError::Transmit(TransmitError::Write(_)))
    ));
    assert_eq!(scheduler.report().frames, 0);
    assert_eq!(scheduler.state().current(), FrameState::Cancelled);
    assert_eq!(kinds(&log), vec!["time", "draw"]);
}

#[test]
fn test_wrong_frame_size_is_render_error() {
    let log = Log::default();
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::with_len(&log, [1, 1, 1], 3),
        RecordingDriver::new(&log),
        None,
        options(1),
    );

    let result = scheduler.run(&CancellationToken::new());

    assert!(matches!(
        result,
        Err(FrameError::Render(RenderError::FrameSize {
            expected: 24,
            actual: 9
        }))
    ));
    assert!(!kinds(&log).contains(&"submit"));
}

#[test]
fn test_cancelled_before_start_runs_no_frames() {
    let log = Log::default();
    let audio = audio_input(&log, vec![Ok(sine_block(200.0, 0.5, 0))]);
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [0, 0, 0]),
        RecordingDriver::new(&log),
        Some(audio),
        SchedulerOptions::default(),
    );
    let token = CancellationToken::new();
    token.cancel();

    let report = scheduler.run(&token).unwrap();

    assert_eq!(report.frames, 0);
    assert!(log.borrow().is_empty());
    assert_eq!(scheduler.state().current(), FrameState::Cancelled);
}

#[test]
fn test_cancel_during_transmit_stops_after_that_frame() {
    let log = Log::default();
    let token = CancellationToken::new();
    let mut driver = RecordingDriver::new(&log);
    driver.cancel_on = Some((2, token.clone()));
    let audio = audio_input(
        &log,
        (0..4).map(|i| Ok(sine_block(200.0, 0.5, i * BLOCK))).collect(),
    );
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [0, 0, 0]),
        driver,
        Some(audio),
        SchedulerOptions::default(),
    );

    let report = scheduler.run(&token).unwrap();

    assert_eq!(report.frames, 2);
    assert_eq!(scheduler.driver().submits, 2);
    assert_eq!(kinds(&log).last(), Some(&"submit"));
    assert_eq!(
        kinds(&log).iter().filter(|&&k| k == "draw").count(),
        2
    );
    assert_eq!(scheduler.state().current(), FrameState::Cancelled);
}

#[test]
fn test_frames_are_colour_corrected_and_packed() {
    let log = Log::default();
    let mut led = led_config();
    led.brightness = 128;
    let mut scheduler = FrameScheduler::new(
        &led,
        RecordingRenderer::new(&log, [255, 0, 255]),
        RecordingDriver::new(&log),
        None,
        options(1),
    );
    scheduler.run(&CancellationToken::new()).unwrap();

    let submitted = log
        .borrow()
        .iter()
        .find_map(|e| match e {
            Event::Submit(words) => Some(words.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(submitted, vec![0x0080_0080; (WIDTH * HEIGHT) as usize]);
}

#[test]
fn test_loop_is_paced_by_frame_period() {
    let log = Log::default();
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [0, 0, 0]),
        RecordingDriver::new(&log),
        None,
        SchedulerOptions {
            frame_period: Duration::from_millis(20),
            max_frames: Some(3),
        },
    );

    let started = Instant::now();
    let report = scheduler.run(&CancellationToken::new()).unwrap();

    assert_eq!(report.frames, 3);
    assert!(started.elapsed() >= Duration::from_millis(40));

    let times: Vec<f32> = log
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::SetTime(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert_eq!(times.len(), 3);
    assert!(times.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_metrics_recorded_per_frame() {
    let log = Log::default();
    let audio = audio_input(&log, vec![Ok(sine_block(200.0, 0.5, 0))]);
    let mut scheduler = FrameScheduler::new(
        &led_config(),
        RecordingRenderer::new(&log, [0, 0, 0]),
        RecordingDriver::new(&log),
        Some(audio),
        options(2),
    );
    scheduler.run(&CancellationToken::new()).unwrap();

    let summary = scheduler.metrics().summary();
    assert_eq!(summary["t_frame_us"].count, 2);
    assert_eq!(summary["t_capture_us"].count, 2);
    assert_eq!(summary["blocks_per_frame"].count, 2);
}
