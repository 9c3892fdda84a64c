//! Speech capture
//!
//! Records microphone audio into a single clip and transcribes it through the
//! chat backend.

mod capture;
mod stt;

pub use capture::{
    AudioCapture, CpalMicrophone, Microphone, SAMPLE_RATE, list_input_devices, samples_to_wav,
};
pub use stt::SpeechToText;
