//! Audio capture boundary.
//! The frame loop pulls raw mono s16le blocks through [`AudioSource`].
//! [`CpalSource`] fills a ring buffer from cpal's callback thread; the loop
//! thread drains it.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info};

use super::ring_buffer::RingBuffer;
use super::spectrum::BYTES_PER_SAMPLE;
use crate::config::AudioConfig;

/// Seconds of audio buffered between the callback and the frame loop.
const CAPTURE_BUFFER_SECS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("audio input device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open input stream: {0}")]
    Open(String),
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Source of raw little-endian 16-bit mono PCM.
pub trait AudioSource {
    /// Samples buffered and ready to read.
    fn samples_available(&self) -> usize;

    /// Read up to `block_size` samples into `buffer` as s16le bytes.
    /// Returns the number of bytes written.
    fn read(&mut self, buffer: &mut [u8], block_size: usize) -> Result<usize, CaptureError>;
}

struct SharedCapture {
    ring: Mutex<RingBuffer<i16>>,
    stream_error: Mutex<Option<String>>,
}

/// Live capture from a cpal input device.
pub struct CpalSource {
    shared: Arc<SharedCapture>,
    _stream: cpal::Stream,
}

impl CpalSource {
    /// Open the configured (or default) input device as a mono stream at the
    /// configured sample rate and start capturing.
    pub fn open(config: &AudioConfig) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match &config.input_device {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::Open(e.to_string()))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.clone()))?,
            None => host
                .default_input_device()
                .ok_or(CaptureError::NoInputDevice)?,
        };

        let sample_format = device
            .default_input_config()
            .map_err(|e| CaptureError::Open(e.to_string()))?
            .sample_format();

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(SharedCapture {
            ring: Mutex::new(RingBuffer::new(
                (config.sample_rate * CAPTURE_BUFFER_SECS) as usize,
            )),
            stream_error: Mutex::new(None),
        });

        let shared_err = Arc::clone(&shared);
        let on_error = move |err: cpal::StreamError| {
            error!(error = %err, "audio capture error");
            *shared_err.stream_error.lock() = Some(err.to_string());
        };

        let shared_cb = Arc::clone(&shared);
        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut ring = shared_cb.ring.lock();
                    for &s in data {
                        ring.push((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                    }
                },
                on_error,
                None,
            ),
            _ => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mut ring = shared_cb.ring.lock();
                    for &s in data {
                        ring.push(s);
                    }
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| CaptureError::Open(e.to_string()))?;

        stream.play().map_err(|e| CaptureError::Open(e.to_string()))?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate = config.sample_rate,
            "audio capture stream started"
        );

        Ok(Self {
            shared,
            _stream: stream,
        })
    }
}

impl AudioSource for CpalSource {
    fn samples_available(&self) -> usize {
        self.shared.ring.lock().len()
    }

    fn read(&mut self, buffer: &mut [u8], block_size: usize) -> Result<usize, CaptureError> {
        if let Some(err) = self.shared.stream_error.lock().take() {
            return Err(CaptureError::Stream(err));
        }

        let wanted = block_size.min(buffer.len() / BYTES_PER_SAMPLE);
        let mut ring = self.shared.ring.lock();
        let mut written = 0;
        for chunk in buffer.chunks_exact_mut(BYTES_PER_SAMPLE).take(wanted) {
            match ring.pop() {
                Ok(sample) => {
                    chunk.copy_from_slice(&sample.to_le_bytes());
                    written += BYTES_PER_SAMPLE;
                }
                Err(_) => break,
            }
        }
        Ok(written)
    }
}
