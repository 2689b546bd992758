//! Spectrum texture: one band filter per configured band plus the flat
//! `[bands][history]` byte matrix uploaded to the renderer.
//! Row `i` holds band `i`'s loudness history, oldest first, newest in the
//! last column.

use thiserror::Error;
use tracing::debug;

use super::filter::{BandFilter, FilterError};
use crate::config::{AudioConfig, BandSpec};

/// Supported sample width (signed 16-bit little-endian PCM).
pub const BYTES_PER_SAMPLE: usize = 2;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("invalid band configuration: {0}")]
    InvalidBandConfig(String),
    #[error("unsupported sample format: {0} bytes per sample (only 16-bit PCM)")]
    UnsupportedSampleFormat(usize),
    #[error("channel count must be at least 1")]
    InvalidChannelCount,
    #[error("raw block of {len} bytes is not a whole number of {frame_bytes}-byte frames")]
    PartialFrame { len: usize, frame_bytes: usize },
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Dense row-major byte matrix: rows = bands, columns = history samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumMatrix {
    bands: usize,
    history: usize,
    data: Vec<u8>,
}

impl SpectrumMatrix {
    pub fn new(bands: usize, history: usize) -> Self {
        Self {
            bands,
            history,
            data: vec![0; bands * history],
        }
    }

    /// Texture width (history length).
    pub fn width(&self) -> usize {
        self.history
    }

    /// Texture height (band count).
    pub fn height(&self) -> usize {
        self.bands
    }

    pub fn row(&self, band: usize) -> &[u8] {
        let start = band * self.history;
        &self.data[start..start + self.history]
    }

    fn row_mut(&mut self, band: usize) -> &mut [u8] {
        let start = band * self.history;
        &mut self.data[start..start + self.history]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Newest value of a band (last column).
    pub fn latest(&self, band: usize) -> u8 {
        self.row(band)[self.history - 1]
    }
}

/// Owns the band filters and the exported history matrix.
#[derive(Debug, Clone)]
pub struct SpectrumTexture {
    bands: Vec<BandFilter>,
    history_length: usize,
    block_size: usize,
    samples: Vec<f32>,
    matrix: SpectrumMatrix,
}

impl SpectrumTexture {
    /// Build one filter per band, ordered low to high.
    pub fn configure(
        bands: &[BandSpec],
        history_length: usize,
        sample_rate: u32,
        block_size: usize,
        pregain: f32,
    ) -> Result<Self, SpectrumError> {
        if bands.is_empty() {
            return Err(SpectrumError::InvalidBandConfig(
                "at least one band is required".into(),
            ));
        }
        if let Some((i, band)) = bands.iter().enumerate().find(|(_, b)| !(b.bandwidth_hz > 0.0)) {
            return Err(SpectrumError::InvalidBandConfig(format!(
                "band {i} has non-positive bandwidth {} Hz",
                band.bandwidth_hz
            )));
        }
        if history_length == 0 || block_size == 0 {
            return Err(SpectrumError::InvalidBandConfig(
                "history length and block size must be non-zero".into(),
            ));
        }

        let filters = bands
            .iter()
            .map(|b| {
                BandFilter::new(
                    sample_rate as f64,
                    b.center_hz,
                    b.bandwidth_hz,
                    block_size,
                    history_length,
                    pregain,
                )
            })
            .collect::<Vec<_>>();

        debug!(
            bands = filters.len(),
            history_length, block_size, sample_rate, "spectrum_configured"
        );

        Ok(Self {
            matrix: SpectrumMatrix::new(filters.len(), history_length),
            bands: filters,
            history_length,
            block_size,
            samples: vec![0.0; block_size],
        })
    }

    pub fn from_config(config: &AudioConfig) -> Result<Self, SpectrumError> {
        Self::configure(
            &config.bands,
            config.history_length,
            config.sample_rate,
            config.block_size,
            config.pregain,
        )
    }

    /// Decode one raw PCM block, advance every band in order, then rebuild
    /// the matrix. The matrix is untouched if any band rejects the block.
    pub fn ingest(
        &mut self,
        raw: &[u8],
        channel_count: usize,
        bytes_per_sample: usize,
    ) -> Result<(), SpectrumError> {
        if bytes_per_sample != BYTES_PER_SAMPLE {
            return Err(SpectrumError::UnsupportedSampleFormat(bytes_per_sample));
        }
        if channel_count == 0 {
            return Err(SpectrumError::InvalidChannelCount);
        }

        let frame_bytes = BYTES_PER_SAMPLE * channel_count;
        if raw.len() % frame_bytes != 0 {
            return Err(SpectrumError::PartialFrame {
                len: raw.len(),
                frame_bytes,
            });
        }
        let frames = raw.len() / frame_bytes;
        if frames != self.block_size {
            return Err(FilterError::InvalidBlockSize {
                expected: self.block_size,
                actual: frames,
            }
            .into());
        }

        decode_pcm_s16le(raw, channel_count, &mut self.samples);
        for band in self.bands.iter_mut() {
            band.process_block(&self.samples)?;
        }
        self.rebuild();
        Ok(())
    }

    /// Copy every band's history into its row, right-aligned so the newest
    /// sample always lands in the last column.
    fn rebuild(&mut self) {
        for (i, band) in self.bands.iter().enumerate() {
            let history = band.history();
            let pad = self.history_length - history.len();
            let row = self.matrix.row_mut(i);
            row[..pad].fill(0);
            history.peek_into(&mut row[pad..]);
        }
    }

    /// Most recent completed matrix.
    pub fn snapshot(&self) -> &SpectrumMatrix {
        &self.matrix
    }

    pub fn bands(&self) -> &[BandFilter] {
        &self.bands
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes of one raw mono block.
    pub fn block_bytes(&self) -> usize {
        self.block_size * BYTES_PER_SAMPLE
    }

    #[cfg(test)]
    pub(crate) fn push_levels(&mut self, levels: &[u8]) {
        for (band, &level) in self.bands.iter_mut().zip(levels) {
            band.history_mut().push(level);
        }
        self.rebuild();
    }
}

/// Decode interleaved little-endian i16 PCM into normalized mono samples,
/// averaging channels. Writes `out.len()` frames; missing input reads as 0.
pub fn decode_pcm_s16le(raw: &[u8], channel_count: usize, out: &mut [f32]) {
    let frame_bytes = BYTES_PER_SAMPLE * channel_count;
    let mut frames = raw.chunks_exact(frame_bytes);
    for slot in out.iter_mut() {
        *slot = match frames.next() {
            Some(frame) => {
                let sum: f32 = frame
                    .chunks_exact(BYTES_PER_SAMPLE)
                    .map(|s| i16::from_le_bytes([s[0], s[1]]) as f32 / 32768.0)
                    .sum();
                sum / channel_count as f32
            }
            None => 0.0,
        };
    }
}
