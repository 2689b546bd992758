//! Renderer boundary and the built-in CPU renderer.
//! A renderer receives the spectrum matrix and elapsed time as inputs and
//! produces a row-major RGB frame (3 bytes per pixel). Shader-backed
//! renderers plug in through the same trait.

use std::f32::consts::PI;

use thiserror::Error;

use crate::audio::SpectrumMatrix;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("draw failed: {0}")]
    Draw(String),
    #[error("frame has {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
}

pub trait Renderer {
    /// Upload the spectrum history used by the next draw.
    fn set_spectrum_texture(&mut self, matrix: &SpectrumMatrix);

    fn set_time(&mut self, seconds: f32);

    /// Draw one frame and return it as row-major RGB bytes.
    fn draw(&mut self) -> Result<&[u8], RenderError>;
}

/// Draws one vertical bar per column group, height from the newest loudness
/// of the band under that column. Without a spectrum it cycles three phase
/// shifted sine waves across the matrix.
pub struct SpectrumBarsRenderer {
    width: u32,
    height: u32,
    time: f32,
    levels: Vec<u8>,
    has_spectrum: bool,
    frame: Vec<u8>,
}

impl SpectrumBarsRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            time: 0.0,
            levels: Vec::new(),
            has_spectrum: false,
            frame: vec![0; width as usize * height as usize * 3],
        }
    }

    fn draw_bars(&mut self) {
        let (w, h) = (self.width as usize, self.height as usize);
        let bands = self.levels.len();
        for x in 0..w {
            let band = x * bands / w;
            let level = self.levels[band] as usize;
            let lit = (level * h + 127) / 255;
            let hue = band as f32 / bands as f32 + self.time * 0.05;
            let color = hue_to_rgb(hue);
            for y in 0..h {
                // row 0 is the top; bars grow upwards
                let on = h - y <= lit;
                let idx = (y * w + x) * 3;
                let px = if on { color } else { [0, 0, 0] };
                self.frame[idx..idx + 3].copy_from_slice(&px);
            }
        }
    }

    fn draw_idle(&mut self) {
        let count = self.width as usize * self.height as usize;
        let offset = self.time * 1.5;
        for (i, px) in self.frame.chunks_exact_mut(3).enumerate() {
            let position = i as f32 / count as f32 * 2.0 * PI;
            let wave = |phase: f32| ((position + offset + phase).sin().max(0.0) * 255.0) as u8;
            px[0] = wave(0.0);
            px[1] = wave(4.0 * PI / 3.0);
            px[2] = wave(2.0 * PI / 3.0);
        }
    }
}

impl Renderer for SpectrumBarsRenderer {
    fn set_spectrum_texture(&mut self, matrix: &SpectrumMatrix) {
        self.levels.clear();
        self.levels
            .extend((0..matrix.height()).map(|band| matrix.latest(band)));
        self.has_spectrum = !self.levels.is_empty();
    }

    fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    fn draw(&mut self) -> Result<&[u8], RenderError> {
        if self.has_spectrum {
            self.draw_bars();
        } else {
            self.draw_idle();
        }
        Ok(&self.frame)
    }
}

/// Fully saturated colour for a hue in turns (wraps).
fn hue_to_rgb(hue: f32) -> [u8; 3] {
    let h = hue.rem_euclid(1.0) * 6.0;
    let f = h - h.floor();
    let rise = (f * 255.0) as u8;
    let fall = 255 - rise;
    match h as u32 {
        0 => [255, rise, 0],
        1 => [fall, 255, 0],
        2 => [0, 255, rise],
        3 => [0, fall, 255],
        4 => [rise, 0, 255],
        _ => [255, 0, fall],
    }
}
