//! Decoder abstraction
//!
//! The engine core never touches containers or codecs directly: it pulls
//! interleaved f32 frames from an [`AudioSource`], which reports the native
//! sample rate, channel count and total length of the underlying file and
//! supports random-access seeks. [`open_source`] is the factory the channel
//! uses; the default backend decodes through Symphonia.
//!
//! A source that hits a decode error mid-stream reports end-of-stream (a
//! zero-frame read) rather than propagating an error into buffer
//! production.

mod backend;

pub use backend::SymphoniaSource;

use std::path::Path;

use crate::types::Sample;

/// Errors opening or seeking an audio source
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Unknown sample rate")]
    UnknownSampleRate,

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Seek failed: {0}")]
    Seek(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// A streaming, seekable source of interleaved f32 frames
///
/// One frame is `channels()` consecutive samples. `read` returns the number
/// of whole frames written; a short or zero read signals end-of-stream.
pub trait AudioSource: Send {
    /// Native sample rate of the source
    fn sample_rate(&self) -> u32;

    /// Channel count of the source (1 = mono, 2 = stereo)
    fn channels(&self) -> u16;

    /// Total length in frames (0 when the container does not declare it)
    fn frames_total(&self) -> u64;

    /// Current read position in frames
    fn position_frames(&self) -> u64;

    /// Read up to `frames` frames of interleaved samples into `out`
    ///
    /// `out` is cleared first. Returns the number of frames produced; 0
    /// means end-of-stream. Decode errors are logged and reported as
    /// end-of-stream, never panics.
    fn read(&mut self, frames: usize, out: &mut Vec<Sample>) -> usize;

    /// Seek to an absolute frame position
    fn seek(&mut self, frame: u64) -> DecodeResult<()>;
}

/// Open a file as an [`AudioSource`] using the Symphonia backend
pub fn open_source(path: &Path) -> DecodeResult<Box<dyn AudioSource>> {
    Ok(Box::new(SymphoniaSource::open(path)?))
}
