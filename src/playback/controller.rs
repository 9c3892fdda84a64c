//! Self-advancing playback driver
//!
//! Wraps a [`PlaybackQueue`] and a [`ClipPlayer`]. Each attempt runs on its
//! own task; when it ends (completed or failed) the next clip starts. A reset
//! aborts the running task, which stops output immediately.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use super::queue::{PlaybackQueue, Step, Ticket};
use crate::Result;

/// Broadcast channel capacity for playback events
const CHANNEL_CAPACITY: usize = 64;

/// Plays a single clip to completion
///
/// Dropping the returned future must stop output.
#[async_trait]
pub trait ClipPlayer: Send + Sync + 'static {
    /// Play `clip`, resolving once playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if the clip cannot be loaded or played
    async fn play(&self, clip: &str) -> Result<()>;
}

/// Observable playback progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A clip began playing
    Started { clip: String },
    /// A clip played to the end
    Finished { clip: String },
    /// A clip could not be played and was skipped
    Failed { clip: String, error: String },
    /// The active clip was stopped by a reset
    Stopped { clip: String },
    /// The queue drained
    Idle,
}

/// Short form of a clip reference for logs; inline payloads are elided
#[must_use]
pub fn clip_label(clip: &str) -> &str {
    if clip.starts_with("data:") {
        clip.split_once(',').map_or(clip, |(meta, _)| meta)
    } else {
        clip
    }
}

struct Inner {
    queue: PlaybackQueue,
    task: Option<AbortHandle>,
    enabled: bool,
}

/// Shared handle to the session's playback queue
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Mutex<Inner>>,
    player: Arc<dyn ClipPlayer>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackController {
    /// Create an idle controller with output enabled
    #[must_use]
    pub fn new(player: Arc<dyn ClipPlayer>) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: PlaybackQueue::new(),
                task: None,
                enabled: true,
            })),
            player,
            events,
        }
    }

    /// Subscribe to playback events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Queue a clip, starting it right away when nothing is playing
    ///
    /// Returns `false` (and queues nothing) while output is disabled.
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, clip: impl Into<String>) -> bool {
        let mut inner = self.lock();
        if !inner.enabled {
            return false;
        }

        let clip = clip.into();
        tracing::debug!(clip = clip_label(&clip), "clip queued");
        if let Some(ticket) = inner.queue.enqueue(clip) {
            self.start(&mut inner, ticket);
        }
        true
    }

    /// Stop the active clip and drop everything pending
    pub fn reset(&self) {
        let mut inner = self.lock();
        Self::stop(&mut inner, &self.events);
    }

    /// Enable or disable audio output
    ///
    /// Disabling resets the queue; enabling does not replay anything.
    pub fn set_enabled(&self, enabled: bool) {
        let mut inner = self.lock();
        if !enabled {
            Self::stop(&mut inner, &self.events);
        }
        inner.enabled = enabled;
        tracing::debug!(enabled, "audio output toggled");
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Whether no clip is currently playing
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock().queue.is_idle()
    }

    /// Number of clips waiting or playing
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(inner: &mut Inner, events: &broadcast::Sender<PlaybackEvent>) {
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        if let Some(ticket) = inner.queue.reset() {
            tracing::debug!(clip = clip_label(ticket.clip()), "playback stopped");
            let _ = events.send(PlaybackEvent::Stopped {
                clip: ticket.clip().to_string(),
            });
        }
    }

    fn start(&self, inner: &mut Inner, ticket: Ticket) {
        tracing::debug!(clip = clip_label(ticket.clip()), token = ticket.token(), "playback started");
        let _ = self.events.send(PlaybackEvent::Started {
            clip: ticket.clip().to_string(),
        });

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = controller.player.play(ticket.clip()).await;
            controller.finish(&ticket, outcome);
        });
        inner.task = Some(handle.abort_handle());
    }

    fn finish(&self, ticket: &Ticket, outcome: Result<()>) {
        let mut inner = self.lock();

        let step = inner.queue.finish(ticket);
        if step == Step::Stale {
            tracing::trace!(clip = clip_label(ticket.clip()), "ignoring superseded playback attempt");
            return;
        }
        inner.task = None;

        let clip = ticket.clip().to_string();
        let event = match outcome {
            Ok(()) => PlaybackEvent::Finished { clip },
            Err(e) => {
                tracing::warn!(error = %e, clip = clip_label(&clip), "clip playback failed, skipping");
                PlaybackEvent::Failed {
                    clip,
                    error: e.to_string(),
                }
            }
        };
        let _ = self.events.send(event);

        match step {
            Step::Next(next) => self.start(&mut inner, next),
            Step::Idle => {
                tracing::debug!("playback queue drained");
                let _ = self.events.send(PlaybackEvent::Idle);
            }
            Step::Stale => {}
        }
    }
}
