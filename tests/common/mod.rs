//! Shared test utilities
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use futures::StreamExt;
use parley::playback::ClipPlayer;
use parley::voice::Microphone;
use parley::{Error, StreamRecord};
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });

    format!("http://{addr}")
}

/// Encode records as NDJSON, one line each
pub fn ndjson(records: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (sentence, audio_url) in records {
        let record = StreamRecord {
            sentence: (*sentence).to_string(),
            audio_url: (*audio_url).to_string(),
        };
        body.extend(serde_json::to_vec(&record).expect("encode record"));
        body.push(b'\n');
    }
    body
}

/// Split `data` at the given byte offsets
pub fn split_at(data: &[u8], offsets: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &offset in offsets {
        chunks.push(data[start..offset].to_vec());
        start = offset;
    }
    chunks.push(data[start..].to_vec());
    chunks
}

/// A response body delivered as separate, delayed chunks
///
/// When `fail` is set the body errors after the last chunk instead of
/// terminating cleanly.
pub fn chunked_body(chunks: Vec<Vec<u8>>, fail: bool) -> Body {
    let mut items: Vec<Result<Bytes, std::io::Error>> =
        chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
    if fail {
        items.push(Err(std::io::Error::other("connection reset")));
    }

    let stream = futures::stream::iter(items).then(|item| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        item
    });
    Body::from_stream(stream)
}

/// Poll `condition` until it holds, panicking after a few seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}

/// [`ClipPlayer`] that records what it was asked to play
///
/// Clips listed as stalled never finish; clips listed as failing error out.
#[derive(Clone, Default)]
pub struct RecordingPlayer {
    started: Arc<Mutex<Vec<String>>>,
    failing: Vec<String>,
    stalled: Vec<String>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, clip: &str) -> Self {
        self.failing.push(clip.to_string());
        self
    }

    pub fn stalled(mut self, clip: &str) -> Self {
        self.stalled.push(clip.to_string());
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipPlayer for RecordingPlayer {
    async fn play(&self, clip: &str) -> parley::Result<()> {
        self.started.lock().unwrap().push(clip.to_string());

        if self.stalled.iter().any(|c| c == clip) {
            std::future::pending::<()>().await;
        }
        if self.failing.iter().any(|c| c == clip) {
            return Err(Error::Playback(format!("cannot play {clip}")));
        }
        Ok(())
    }
}

/// [`Microphone`] returning a fixed clip
#[derive(Default)]
pub struct FakeMicrophone {
    clip: Vec<u8>,
    fail_start: bool,
    recording: bool,
    devices: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeMicrophone {
    pub fn with_clip(clip: &[u8]) -> Self {
        Self {
            clip: clip.to_vec(),
            ..Self::default()
        }
    }

    /// A microphone whose device can never be acquired
    pub fn unavailable() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Devices requested so far, shared with the test
    pub fn devices(&self) -> Arc<Mutex<Vec<Option<String>>>> {
        Arc::clone(&self.devices)
    }
}

impl Microphone for FakeMicrophone {
    fn start(&mut self, device: Option<&str>) -> parley::Result<()> {
        self.devices
            .lock()
            .unwrap()
            .push(device.map(ToString::to_string));
        if self.fail_start {
            return Err(Error::Audio("permission denied".to_string()));
        }
        self.recording = true;
        Ok(())
    }

    fn finish(&mut self) -> parley::Result<Vec<u8>> {
        if !self.recording {
            return Err(Error::Audio("not recording".to_string()));
        }
        self.recording = false;
        Ok(self.clip.clone())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
