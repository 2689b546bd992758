//! Frame dump: writes each submitted LED frame to a PNG so output can be
//! inspected without hardware.

use std::path::PathBuf;

use image::RgbImage;
use tracing::debug;

use super::{unpack_led_word, LedDriver, TransmitError};

pub struct PngDumpDriver {
    path: PathBuf,
    pixels: Vec<u8>,
}

impl PngDumpDriver {
    /// Every frame overwrites the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pixels: Vec::new(),
        }
    }
}

impl LedDriver for PngDumpDriver {
    fn submit(&mut self, frame: &[u32], width: u32, height: u32) -> Result<(), TransmitError> {
        let expected = width as usize * height as usize;
        if frame.len() != expected {
            return Err(TransmitError::SizeMismatch {
                expected,
                actual: frame.len(),
            });
        }

        self.pixels.clear();
        self.pixels.extend(frame.iter().flat_map(|&w| unpack_led_word(w)));

        let image = RgbImage::from_raw(width, height, std::mem::take(&mut self.pixels))
            .ok_or_else(|| TransmitError::Write("frame buffer size mismatch".into()))?;
        let result = image.save(&self.path);
        self.pixels = image.into_raw();
        result?;

        debug!(path = %self.path.display(), width, height, "frame_dumped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::pack_led_word;

    #[test]
    fn test_dump_round_trips_colors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut driver = PngDumpDriver::new(&path);

        let frame = [
            pack_led_word(255, 0, 0),
            pack_led_word(0, 255, 0),
            pack_led_word(0, 0, 255),
            pack_led_word(10, 20, 30),
        ];
        driver.submit(&frame, 2, 2).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 255, 0]);
        assert_eq!(img.get_pixel(0, 1).0, [0, 0, 255]);
        assert_eq!(img.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_dump_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = PngDumpDriver::new(dir.path().join("frame.png"));
        assert!(matches!(
            driver.submit(&[0; 3], 2, 2),
            Err(TransmitError::SizeMismatch { .. })
        ));
    }
}
