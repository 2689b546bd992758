//! Per-band filter and loudness envelope.
//! Each band runs a cascade of band-pass biquads over every captured block,
//! reduces the filtered block to one RMS loudness byte and appends it to the
//! band's history ring.

use std::f64::consts::PI;

use thiserror::Error;

use super::ring_buffer::RingBuffer;

/// Number of cascaded biquad sections per band (4th order band-pass).
pub const FILTER_STAGES: usize = 2;

/// Bottom of the display range: anything quieter maps to 0.
pub const DISPLAY_FLOOR_DB: f32 = -60.0;
/// Top of the display range: anything louder maps to 255.
pub const DISPLAY_CEILING_DB: f32 = -6.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("sample block has {actual} samples, expected {expected}")]
    InvalidBlockSize { expected: usize, actual: usize },
}

/// Normalized biquad coefficients (a0 == 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    /// Band-pass with 0 dB gain at `center_hz`.
    pub fn band_pass(sample_rate: f64, center_hz: f64, bandwidth_hz: f64) -> Self {
        let center = center_hz.clamp(1.0, sample_rate * 0.499);
        let q = (center / bandwidth_hz.max(f64::EPSILON)).max(0.01);

        let w0 = 2.0 * PI * center / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * w0.cos() / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Transposed direct form II step.
    #[inline]
    fn tick(&self, state: &mut SectionState, x: f64) -> f64 {
        let y = self.b0 * x + state.z1;
        state.z1 = self.b1 * x - self.a1 * y + state.z2;
        state.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Delay line of one biquad section.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SectionState {
    pub z1: f64,
    pub z2: f64,
}

/// Complete mutable filter state of a band. Depends only on the samples fed
/// since the last `setup`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    pub sections: [SectionState; FILTER_STAGES],
}

impl FilterState {
    pub fn is_at_rest(&self) -> bool {
        *self == Self::default()
    }
}

/// Band-pass filter + envelope follower for one frequency band.
#[derive(Debug, Clone)]
pub struct BandFilter {
    sample_rate: f64,
    center_hz: f64,
    bandwidth_hz: f64,
    block_size: usize,
    pregain: f32,
    coeffs: Biquad,
    state: FilterState,
    history: RingBuffer<u8>,
}

impl BandFilter {
    /// Create a configured filter keeping `history_length` loudness samples.
    pub fn new(
        sample_rate: f64,
        center_hz: f64,
        bandwidth_hz: f64,
        block_size: usize,
        history_length: usize,
        pregain: f32,
    ) -> Self {
        Self {
            sample_rate,
            center_hz,
            bandwidth_hz,
            block_size,
            pregain,
            coeffs: Biquad::band_pass(sample_rate, center_hz, bandwidth_hz),
            state: FilterState::default(),
            history: RingBuffer::new(history_length),
        }
    }

    /// Reconfigure the band-pass stage. Resets the filter state; the
    /// loudness history is kept.
    pub fn setup(&mut self, sample_rate: f64, center_hz: f64, bandwidth_hz: f64) {
        self.sample_rate = sample_rate;
        self.center_hz = center_hz;
        self.bandwidth_hz = bandwidth_hz;
        self.coeffs = Biquad::band_pass(sample_rate, center_hz, bandwidth_hz);
        self.state = FilterState::default();
    }

    /// Filter one block of normalized mono samples, push its loudness byte
    /// into the history and return that byte.
    pub fn process_block(&mut self, samples: &[f32]) -> Result<u8, FilterError> {
        if samples.len() != self.block_size {
            return Err(FilterError::InvalidBlockSize {
                expected: self.block_size,
                actual: samples.len(),
            });
        }

        let mut sum_sq = 0.0f64;
        for &x in samples {
            let mut y = x as f64;
            for section in self.state.sections.iter_mut() {
                y = self.coeffs.tick(section, y);
            }
            sum_sq += y * y;
        }
        let rms = (sum_sq / samples.len() as f64).sqrt() as f32;

        let level = loudness_to_byte(rms, self.pregain);
        self.history.push(level);
        Ok(level)
    }

    pub fn history(&self) -> &RingBuffer<u8> {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut RingBuffer<u8> {
        &mut self.history
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn coefficients(&self) -> &Biquad {
        &self.coeffs
    }

    pub fn center_hz(&self) -> f64 {
        self.center_hz
    }

    pub fn bandwidth_hz(&self) -> f64 {
        self.bandwidth_hz
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Map an RMS amplitude to a display byte. Scales by `pregain`, converts to
/// dBFS, spreads [`DISPLAY_FLOOR_DB`, `DISPLAY_CEILING_DB`] over 0..=255,
/// rounds half up and saturates.
pub fn loudness_to_byte(rms: f32, pregain: f32) -> u8 {
    let level = rms * pregain;
    // also rejects NaN
    if !(level > 0.0) {
        return 0;
    }
    let db = 20.0 * level.log10();
    let scaled = (db - DISPLAY_FLOOR_DB) / (DISPLAY_CEILING_DB - DISPLAY_FLOOR_DB) * 255.0;
    (scaled + 0.5).floor().clamp(0.0, 255.0) as u8
}
