//! Audio capture from microphone

use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Source of recorded speech clips
///
/// A recording runs between [`Microphone::start`] and [`Microphone::finish`];
/// the device is held only while recording.
pub trait Microphone {
    /// Acquire the device and begin buffering audio
    ///
    /// `device` selects an input by name; `None` uses the system default.
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be acquired; no recording is started
    fn start(&mut self, device: Option<&str>) -> Result<()>;

    /// Stop recording, release the device and return the clip as WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if nothing is being recorded or encoding fails
    fn finish(&mut self) -> Result<Vec<u8>>;

    /// Whether a recording is in progress
    fn is_recording(&self) -> bool;
}

/// Names of the available input devices
///
/// # Errors
///
/// Returns error if the audio host cannot enumerate devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Resolve an input device by name, or the default device
fn find_input_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    let Some(name) = name else {
        return host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()));
    };

    host.input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|d| d.name().is_ok_and(|n| n == name))
        .ok_or_else(|| Error::Audio(format!("input device not found: {name}")))
}

/// Captures audio from an input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open an input device by name, or the default device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(name: Option<&str>) -> Result<Self> {
        let device = find_input_device(name)?;
        let rate = SampleRate(SAMPLE_RATE);

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: stereo, downmixed while buffering
                device
                    .supported_input_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config.with_sample_rate(rate).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let channels = usize::from(self.config.channels.max(1));

        #[allow(clippy::cast_precision_loss)]
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        if channels == 1 {
                            buf.extend_from_slice(data);
                        } else {
                            buf.extend(
                                data.chunks(channels)
                                    .map(|f| f.iter().sum::<f32>() / f.len() as f32),
                            );
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio and release the device stream
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Get captured audio buffer and clear it
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *buf)
    }

    /// Get captured audio buffer without clearing
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    /// Clear the audio buffer
    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

/// [`Microphone`] backed by a cpal input device
#[derive(Default)]
pub struct CpalMicrophone {
    capture: Option<AudioCapture>,
}

impl CpalMicrophone {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Microphone for CpalMicrophone {
    fn start(&mut self, device: Option<&str>) -> Result<()> {
        if self.capture.is_some() {
            return Err(Error::Audio("already recording".to_string()));
        }

        let mut capture = AudioCapture::open(device)?;
        capture.start()?;
        self.capture = Some(capture);
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        let mut capture = self
            .capture
            .take()
            .ok_or_else(|| Error::Audio("not recording".to_string()))?;

        capture.stop();
        let samples = capture.take_buffer();
        tracing::debug!(samples = samples.len(), "recording finished");

        samples_to_wav(&samples, capture.sample_rate())
    }

    fn is_recording(&self) -> bool {
        self.capture.is_some()
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
