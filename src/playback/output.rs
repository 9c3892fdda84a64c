//! Clip resolution, decoding and speaker output

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use url::Url;

use super::controller::ClipPlayer;
use crate::{Error, Result};

/// Poll interval while waiting for output to drain
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Grace period beyond the clip's nominal duration
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Turns clip references into encoded audio bytes
///
/// Supports `data:` URLs with base64 payloads, absolute `http(s)` URLs, and
/// paths relative to the backend base URL.
#[derive(Debug, Clone)]
pub struct ClipResolver {
    client: reqwest::Client,
    base_url: Url,
}

impl ClipResolver {
    /// Create a resolver for references relative to `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if `base_url` is not a valid URL
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid server url {base_url}: {e}")))?;
        Ok(Self { client, base_url })
    }

    /// Fetch the encoded bytes behind a clip reference
    ///
    /// # Errors
    ///
    /// Returns error if the reference is malformed or the download fails
    pub async fn fetch(&self, clip: &str) -> Result<Vec<u8>> {
        if clip.starts_with("data:") {
            return decode_data_url(clip);
        }

        let url = self
            .base_url
            .join(clip)
            .map_err(|e| Error::Playback(format!("invalid clip reference {clip}: {e}")))?;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Playback(format!("clip fetch {url} failed: {status}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Decode the payload of a `data:` URL (base64 encoding only)
///
/// # Errors
///
/// Returns error if the URL is malformed or not base64 encoded
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::Playback("not a data url".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Playback("data url has no payload".to_string()))?;

    if !meta.ends_with(";base64") {
        return Err(Error::Playback(format!(
            "unsupported data url encoding: {meta}"
        )));
    }

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Playback(format!("invalid base64 payload: {e}")))
}

/// PCM samples ready for output
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode MP3 or WAV bytes into mono samples
///
/// # Errors
///
/// Returns error if the payload cannot be decoded
pub fn decode_clip(data: &[u8]) -> Result<DecodedClip> {
    if data.starts_with(b"RIFF") {
        decode_wav(data)
    } else {
        decode_mp3(data)
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_wav(data: &[u8]) -> Result<DecodedClip> {
    let reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Playback(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Playback(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Playback(e.to_string()))?
        }
    };

    Ok(DecodedClip {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

fn decode_mp3(data: &[u8]) -> Result<DecodedClip> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();
                }
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels.max(1)));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Playback("no audio frames in clip".to_string()));
    }

    Ok(DecodedClip {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels down to mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Sets the shared stop flag when the owning future is dropped
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Plays clips through the default output device
#[derive(Debug, Clone)]
pub struct SpeakerPlayer {
    resolver: ClipResolver,
}

impl SpeakerPlayer {
    #[must_use]
    pub const fn new(resolver: ClipResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ClipPlayer for SpeakerPlayer {
    async fn play(&self, clip: &str) -> Result<()> {
        let data = self.resolver.fetch(clip).await?;
        let decoded = decode_clip(&data)?;

        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(Arc::clone(&stop));

        tokio::task::spawn_blocking(move || play_blocking(&decoded, &stop))
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }
}

/// Find an output config for `sample_rate`, preferring mono
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.sample_format() == cpal::SampleFormat::F32
            && c.min_sample_rate() <= rate
            && c.max_sample_rate() >= rate
    };

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| {
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports(c, 2))
        })
        .ok_or_else(|| {
            Error::Audio(format!("no output config supports {sample_rate} Hz"))
        })?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Play samples until they drain or `stop` is raised
fn play_blocking(clip: &DecodedClip, stop: &AtomicBool) -> Result<()> {
    if clip.samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;
    let config = output_config(&device, clip.sample_rate)?;
    let channels = usize::from(config.channels);

    let samples = Arc::new(clip.samples.clone());
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or_else(|| {
                            finished.store(true, Ordering::Relaxed);
                            0.0
                        });
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio output error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (samples.len() as u64 * 1000) / u64::from(clip.sample_rate.max(1));
    let deadline = Instant::now() + Duration::from_millis(duration_ms) + DRAIN_GRACE;

    while !finished.load(Ordering::Relaxed) {
        if stop.load(Ordering::Relaxed) {
            tracing::debug!("output stopped early");
            break;
        }
        if Instant::now() > deadline {
            tracing::warn!("output did not drain before deadline");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    drop(stream);
    tracing::debug!(samples = samples.len(), "clip output complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"ID3 fake");
        let url = format!("data:audio/mp3;base64,{encoded}");
        assert_eq!(decode_data_url(&url).unwrap(), b"ID3 fake");
    }

    #[test]
    fn test_decode_data_url_rejects_plain_encoding() {
        assert!(decode_data_url("data:text/plain,hello").is_err());
        assert!(decode_data_url("data:audio/mp3;base64").is_err());
        assert!(decode_data_url("data:audio/mp3;base64,@@@").is_err());
    }

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix(&[0.5, -0.5, 1.0, 0.0], 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_clip(b"definitely not audio").is_err());
    }

    #[test]
    fn test_resolver_rejects_bad_base() {
        assert!(ClipResolver::new(reqwest::Client::new(), "not a url").is_err());
    }
}
