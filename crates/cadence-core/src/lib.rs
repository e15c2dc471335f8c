//! Cadence Core - Real-time audio playback and mixing engine

pub mod audio;
pub mod config;
pub mod types;
pub mod decode;
pub mod resample;
pub mod effect;
pub mod channel;
pub mod mixer;
pub mod engine;

pub use types::*;
