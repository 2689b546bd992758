//! Configuration loading and validation.
//! The JSON file is parsed into [`AppConfig`] and validated exactly once into
//! an immutable [`PipelineConfig`]; components only ever see validated values.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("frequency_bands = {bands} needs {} cutoff frequencies, got {cutoffs}", .bands + 1)]
    CutoffCountMismatch { bands: usize, cutoffs: usize },
    #[error("band {band} has non-positive bandwidth ({low} Hz .. {high} Hz)")]
    NonPositiveBandwidth { band: usize, low: f32, high: f32 },
    #[error("cutoff frequency {0} Hz must be positive")]
    NonPositiveFrequency(f32),
    #[error("cutoff frequency {hz} Hz is at or above the Nyquist limit of {nyquist} Hz")]
    AboveNyquist { hz: f32, nyquist: f32 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("gamma_correction must be positive, got {0}")]
    InvalidGamma(f32),
    #[error("frame_rate must be positive and give a representable period, got {0}")]
    InvalidFrameRate(f32),
    #[error("pregain must be positive and finite, got {0}")]
    InvalidPregain(f32),
}

/// On-disk configuration file format.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub led: LedSettings,
    #[serde(default)]
    pub audio: Option<AudioSettings>,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedSettings {
    #[serde(default = "default_gpio_pin")]
    pub gpio_pin: u8,
    #[serde(default = "default_dma")]
    pub dma: u8,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default = "default_gamma")]
    pub gamma_correction: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSettings {
    #[serde(default)]
    pub input_device: Option<String>,
    pub frequency_bands: usize,
    /// Band edges in Hz, `frequency_bands + 1` ascending values.
    pub cutoff_frequencies: Vec<f32>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Samples per processing block; one history pixel per block.
    #[serde(default = "default_samples_per_pixel")]
    pub samples_per_pixel: usize,
    /// History length per band (row width of the spectrum matrix).
    #[serde(default = "default_pixels_per_image")]
    pub pixels_per_image: usize,
    #[serde(default = "default_pregain")]
    pub pregain: f32,
}

fn default_frame_rate() -> f32 {
    15.0
}
fn default_gpio_pin() -> u8 {
    12
}
fn default_dma() -> u8 {
    10
}
fn default_brightness() -> u8 {
    255
}
fn default_gamma() -> f32 {
    1.0
}
fn default_sample_rate() -> u32 {
    44_100
}
fn default_samples_per_pixel() -> usize {
    1024
}
fn default_pixels_per_image() -> usize {
    64
}
fn default_pregain() -> f32 {
    1.0
}

/// One analysed frequency band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSpec {
    pub center_hz: f64,
    pub bandwidth_hz: f64,
}

impl BandSpec {
    /// Band spanning `[low, high)`. The center is the geometric mean so the
    /// band-pass -3 dB points land on the cutoffs.
    pub fn from_cutoffs(low: f32, high: f32) -> Self {
        Self {
            center_hz: (low as f64 * high as f64).sqrt(),
            bandwidth_hz: high as f64 - low as f64,
        }
    }
}

/// Validated LED matrix parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LedConfig {
    /// Data pin of the strip, handed to the LED driver.
    pub gpio_pin: u8,
    /// DMA channel used by the strip driver.
    pub dma: u8,
    pub width: u32,
    pub height: u32,
    pub brightness: u8,
    pub gamma: f32,
}

impl LedConfig {
    pub fn led_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Validated audio pipeline parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    pub input_device: Option<String>,
    pub sample_rate: u32,
    pub block_size: usize,
    pub history_length: usize,
    pub pregain: f32,
    pub bands: Vec<BandSpec>,
}

/// Immutable, validated configuration handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub led: LedConfig,
    /// `None` runs the renderer without a spectrum input.
    pub audio: Option<AudioConfig>,
    pub frame_period: Duration,
}

impl AppConfig {
    /// Load and parse a JSON config file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Check every parameter and produce the immutable pipeline config.
    pub fn validate(&self) -> Result<PipelineConfig, ConfigError> {
        let led = &self.led;
        if led.width == 0 {
            return Err(ConfigError::Zero("led.width"));
        }
        if led.height == 0 {
            return Err(ConfigError::Zero("led.height"));
        }
        if !(led.gamma_correction > 0.0) || !led.gamma_correction.is_finite() {
            return Err(ConfigError::InvalidGamma(led.gamma_correction));
        }
        if !(self.frame_rate > 0.0) || !self.frame_rate.is_finite() {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }

        let frame_period = Duration::try_from_secs_f32(1.0 / self.frame_rate)
            .map_err(|_| ConfigError::InvalidFrameRate(self.frame_rate))?;

        let audio = self.audio.as_ref().map(AudioSettings::validate).transpose()?;

        Ok(PipelineConfig {
            led: LedConfig {
                gpio_pin: led.gpio_pin,
                dma: led.dma,
                width: led.width,
                height: led.height,
                brightness: led.brightness,
                gamma: led.gamma_correction,
            },
            audio,
            frame_period,
        })
    }
}

impl AudioSettings {
    fn validate(&self) -> Result<AudioConfig, ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Zero("audio.sample_rate"));
        }
        if self.samples_per_pixel == 0 {
            return Err(ConfigError::Zero("audio.samples_per_pixel"));
        }
        if self.pixels_per_image == 0 {
            return Err(ConfigError::Zero("audio.pixels_per_image"));
        }
        if self.frequency_bands == 0 {
            return Err(ConfigError::Zero("audio.frequency_bands"));
        }
        if !(self.pregain > 0.0) || !self.pregain.is_finite() {
            return Err(ConfigError::InvalidPregain(self.pregain));
        }

        let cutoffs = &self.cutoff_frequencies;
        if cutoffs.len() != self.frequency_bands + 1 {
            return Err(ConfigError::CutoffCountMismatch {
                bands: self.frequency_bands,
                cutoffs: cutoffs.len(),
            });
        }

        let nyquist = self.sample_rate as f32 / 2.0;
        for &hz in cutoffs {
            if !(hz > 0.0) {
                return Err(ConfigError::NonPositiveFrequency(hz));
            }
            if hz >= nyquist {
                return Err(ConfigError::AboveNyquist { hz, nyquist });
            }
        }

        let mut bands = Vec::with_capacity(cutoffs.len() - 1);
        for (band, pair) in cutoffs.windows(2).enumerate() {
            let (low, high) = (pair[0], pair[1]);
            if high <= low {
                return Err(ConfigError::NonPositiveBandwidth { band, low, high });
            }
            bands.push(BandSpec::from_cutoffs(low, high));
        }

        Ok(AudioConfig {
            input_device: self.input_device.clone(),
            sample_rate: self.sample_rate,
            block_size: self.samples_per_pixel,
            history_length: self.pixels_per_image,
            pregain: self.pregain,
            bands,
        })
    }
}
