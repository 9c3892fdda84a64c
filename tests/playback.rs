//! Playback queue integration tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley::playback::ClipPlayer;
use parley::{Error, PlaybackController, PlaybackEvent};
use tokio::sync::{broadcast, mpsc, oneshot};

mod common;
use common::{RecordingPlayer, wait_until};

type Gate = oneshot::Sender<parley::Result<()>>;

/// Player whose clips finish only when the test says so
struct GatedPlayer {
    calls: mpsc::UnboundedSender<(String, Gate)>,
}

impl GatedPlayer {
    fn new() -> (Self, mpsc::UnboundedReceiver<(String, Gate)>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { calls }, rx)
    }
}

#[async_trait]
impl ClipPlayer for GatedPlayer {
    async fn play(&self, clip: &str) -> parley::Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.calls.send((clip.to_string(), tx));
        rx.await
            .unwrap_or_else(|_| Err(Error::Playback("gate dropped".to_string())))
    }
}

async fn next_call(calls: &mut mpsc::UnboundedReceiver<(String, Gate)>) -> (String, Gate) {
    tokio::time::timeout(Duration::from_secs(5), calls.recv())
        .await
        .expect("no clip started in time")
        .expect("player dropped")
}

async fn events_until_idle(events: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no playback event in time")
            .expect("event channel closed");
        let idle = event == PlaybackEvent::Idle;
        seen.push(event);
        if idle {
            return seen;
        }
    }
}

fn started(clip: &str) -> PlaybackEvent {
    PlaybackEvent::Started {
        clip: clip.to_string(),
    }
}

fn finished(clip: &str) -> PlaybackEvent {
    PlaybackEvent::Finished {
        clip: clip.to_string(),
    }
}

#[tokio::test]
async fn test_clips_play_in_order_and_failures_advance() {
    let (player, mut calls) = GatedPlayer::new();
    let controller = PlaybackController::new(Arc::new(player));
    let mut events = controller.subscribe();

    assert!(controller.enqueue("a"));
    assert!(controller.enqueue("b"));
    assert!(controller.enqueue("c"));
    assert_eq!(controller.pending(), 3);

    let (clip, gate) = next_call(&mut calls).await;
    assert_eq!(clip, "a");
    gate.send(Ok(())).unwrap();

    let (clip, gate) = next_call(&mut calls).await;
    assert_eq!(clip, "b");
    gate.send(Err(Error::Playback("decoder exploded".to_string())))
        .unwrap();

    let (clip, gate) = next_call(&mut calls).await;
    assert_eq!(clip, "c");
    gate.send(Ok(())).unwrap();

    let seen = events_until_idle(&mut events).await;
    assert_eq!(seen.len(), 7);
    assert_eq!(seen[0], started("a"));
    assert_eq!(seen[1], finished("a"));
    assert_eq!(seen[2], started("b"));
    assert!(matches!(&seen[3], PlaybackEvent::Failed { clip, error } if clip == "b" && error.contains("decoder exploded")));
    assert_eq!(seen[4], started("c"));
    assert_eq!(seen[5], finished("c"));
    assert_eq!(seen[6], PlaybackEvent::Idle);

    assert!(controller.is_idle());
    assert_eq!(controller.pending(), 0);
}

#[tokio::test]
async fn test_only_one_clip_plays_at_a_time() {
    let (player, mut calls) = GatedPlayer::new();
    let controller = PlaybackController::new(Arc::new(player));

    controller.enqueue("a");
    controller.enqueue("b");

    let (clip, gate) = next_call(&mut calls).await;
    assert_eq!(clip, "a");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(calls.try_recv().is_err(), "second clip started early");

    gate.send(Ok(())).unwrap();
    let (clip, gate) = next_call(&mut calls).await;
    assert_eq!(clip, "b");
    gate.send(Ok(())).unwrap();
}

#[tokio::test]
async fn test_reset_discards_queue_and_ignores_old_attempt() {
    let (player, mut calls) = GatedPlayer::new();
    let controller = PlaybackController::new(Arc::new(player));
    let mut events = controller.subscribe();

    controller.enqueue("a");
    controller.enqueue("b");
    let (clip, stale_gate) = next_call(&mut calls).await;
    assert_eq!(clip, "a");

    controller.reset();
    assert!(controller.is_idle());
    assert_eq!(controller.pending(), 0);

    // Completing the aborted attempt must not advance the queue
    let _ = stale_gate.send(Ok(()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(calls.try_recv().is_err(), "discarded clip was played");

    controller.enqueue("c");
    let (clip, gate) = next_call(&mut calls).await;
    assert_eq!(clip, "c", "discarded clip was played");
    gate.send(Ok(())).unwrap();

    let seen = events_until_idle(&mut events).await;
    assert_eq!(
        seen,
        vec![
            started("a"),
            PlaybackEvent::Stopped {
                clip: "a".to_string()
            },
            started("c"),
            finished("c"),
            PlaybackEvent::Idle,
        ]
    );
}

#[tokio::test]
async fn test_reset_when_idle_is_harmless() {
    let player = RecordingPlayer::new();
    let controller = PlaybackController::new(Arc::new(player.clone()));

    controller.reset();
    controller.reset();

    assert!(controller.is_idle());
    assert!(controller.enqueue("/after.mp3"));
    wait_until(|| controller.is_idle() && player.started().len() == 1).await;
}

#[tokio::test]
async fn test_disabled_output_queues_nothing() {
    let player = RecordingPlayer::new();
    let controller = PlaybackController::new(Arc::new(player.clone()));

    controller.set_enabled(false);
    assert!(!controller.is_enabled());
    assert!(!controller.enqueue("/muted.mp3"));
    assert_eq!(controller.pending(), 0);

    controller.set_enabled(true);
    assert!(controller.enqueue("/loud.mp3"));
    wait_until(|| controller.is_idle()).await;

    assert_eq!(player.started(), vec!["/loud.mp3"]);
}

#[tokio::test]
async fn test_disabling_stops_active_clip() {
    let player = RecordingPlayer::new().stalled("/long.mp3");
    let controller = PlaybackController::new(Arc::new(player.clone()));
    let mut events = controller.subscribe();

    controller.enqueue("/long.mp3");
    controller.enqueue("/next.mp3");
    wait_until(|| !player.started().is_empty()).await;

    controller.set_enabled(false);

    assert!(controller.is_idle());
    assert_eq!(controller.pending(), 0);
    assert_eq!(events.recv().await.unwrap(), started("/long.mp3"));
    assert_eq!(
        events.recv().await.unwrap(),
        PlaybackEvent::Stopped {
            clip: "/long.mp3".to_string()
        }
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(player.started(), vec!["/long.mp3"]);
}
