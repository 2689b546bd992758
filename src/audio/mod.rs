//! Audio-to-texture pipeline.
//! raw PCM → per-band band-pass + RMS envelope → per-band history ring →
//! `[bands][history]` byte matrix for the renderer.

pub mod capture;
pub mod filter;
pub mod ring_buffer;
pub mod spectrum;

pub use capture::{AudioSource, CaptureError, CpalSource};
pub use filter::{BandFilter, FilterError, FilterState};
pub use ring_buffer::{EmptyBufferError, RingBuffer};
pub use spectrum::{SpectrumError, SpectrumMatrix, SpectrumTexture};
