//! Audio playback
//!
//! Clips from a chat response play strictly one at a time, in the order they
//! were queued, advancing on completion or failure.

mod controller;
mod output;
mod queue;

pub use controller::{ClipPlayer, PlaybackController, PlaybackEvent, clip_label};
pub use output::{ClipResolver, DecodedClip, SpeakerPlayer, decode_clip, decode_data_url};
pub use queue::{PlaybackQueue, Step, Ticket};
