//! Audio transcription through the OpenAI Whisper API, with plain text, SRT
//! and WebVTT export.
//!
//! The endpoint returns a bare transcript with no timing and no progress, so
//! two things are approximated here: [`segment`] and [`cue`] cut the text at
//! sentence boundaries into fixed-length cues, and [`progress`] invents a
//! completion percentage while the request is outstanding.

pub mod audio;
pub mod cache;
pub mod config;
pub mod credential;
pub mod cue;
pub mod error;
pub mod export;
pub mod progress;
pub mod segment;
pub mod session;
pub mod whisper;
