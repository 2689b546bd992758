//! LED output boundary.
//! Rendered RGB frames are colour-corrected and packed into the strip's
//! 24-bit word order (`0x00BBGGRR`) before submission to an [`LedDriver`].

pub mod png;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::LedConfig;

pub use png::PngDumpDriver;

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("frame has {actual} LEDs, driver expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("LED write failed: {0}")]
    Write(String),
    #[error("frame dump failed: {0}")]
    Dump(#[from] image::ImageError),
}

/// Consumer of packed LED frames.
pub trait LedDriver {
    fn submit(&mut self, frame: &[u32], width: u32, height: u32) -> Result<(), TransmitError>;
}

impl<T: LedDriver + ?Sized> LedDriver for Box<T> {
    fn submit(&mut self, frame: &[u32], width: u32, height: u32) -> Result<(), TransmitError> {
        (**self).submit(frame, width, height)
    }
}

/// Pack one RGB pixel into the strip's word order.
#[inline]
pub fn pack_led_word(r: u8, g: u8, b: u8) -> u32 {
    (b as u32) << 16 | (g as u32) << 8 | r as u32
}

/// Inverse of [`pack_led_word`].
#[inline]
pub fn unpack_led_word(word: u32) -> [u8; 3] {
    [word as u8, (word >> 8) as u8, (word >> 16) as u8]
}

/// Brightness + gamma lookup applied to every channel.
#[derive(Debug, Clone)]
pub struct ColorCorrection {
    table: [u8; 256],
}

impl ColorCorrection {
    pub fn new(brightness: u8, gamma: f32) -> Self {
        let mut table = [0u8; 256];
        let scale = brightness as f32 / 255.0;
        for (i, slot) in table.iter_mut().enumerate() {
            let linear = (i as f32 / 255.0).powf(gamma);
            *slot = (linear * scale * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8;
        }
        Self { table }
    }

    pub fn from_config(config: &LedConfig) -> Self {
        Self::new(config.brightness, config.gamma)
    }

    #[inline]
    pub fn apply(&self, value: u8) -> u8 {
        self.table[value as usize]
    }

    /// Convert a row-major RGB frame into corrected LED words. `out` is
    /// cleared and refilled, one word per complete pixel.
    pub fn map_frame(&self, rgb: &[u8], out: &mut Vec<u32>) {
        out.clear();
        out.extend(rgb.chunks_exact(3).map(|px| {
            pack_led_word(self.apply(px[0]), self.apply(px[1]), self.apply(px[2]))
        }));
    }
}

impl Default for ColorCorrection {
    fn default() -> Self {
        Self::new(255, 1.0)
    }
}

/// Driver that only logs frames, tagged with the strip's data pin and DMA
/// channel. Used when no hardware is attached.
pub struct TraceDriver {
    gpio_pin: u8,
    dma: u8,
    frames: u64,
}

impl TraceDriver {
    pub fn from_config(led: &LedConfig) -> Self {
        info!(
            gpio_pin = led.gpio_pin,
            dma = led.dma,
            leds = led.led_count(),
            "led_output_configured"
        );
        Self {
            gpio_pin: led.gpio_pin,
            dma: led.dma,
            frames: 0,
        }
    }

    /// `(gpio_pin, dma)` the frames are addressed to.
    pub fn channel(&self) -> (u8, u8) {
        (self.gpio_pin, self.dma)
    }
}

impl LedDriver for TraceDriver {
    fn submit(&mut self, frame: &[u32], width: u32, height: u32) -> Result<(), TransmitError> {
        let expected = width as usize * height as usize;
        if frame.len() != expected {
            return Err(TransmitError::SizeMismatch {
                expected,
                actual: frame.len(),
            });
        }
        self.frames += 1;
        let lit = frame.iter().filter(|&&w| w != 0).count();
        debug!(
            frame = self.frames,
            gpio_pin = self.gpio_pin,
            dma = self.dma,
            leds = frame.len(),
            lit,
            "led_frame"
        );
        Ok(())
    }
}
