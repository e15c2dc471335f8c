//! Engine events, error records, and observer callbacks
//!
//! Rendering raises [`EngineEvent`]s on the producer thread; the control
//! surface records [`EngineError`]s as they happen. Observer callbacks are
//! held here and run on the control thread or the producer thread, never
//! inside the device callback.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{PlaybackState, StereoBuffer};

/// Recover the guard from a poisoned mutex
///
/// A panicking observer callback may poison a lock it was called under.
/// The guarded data is still coherent, so later calls keep working.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Events raised during rendering and delivered on the producer thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A channel drained its source and stopped playing
    ChannelEnded { channel: usize },
    /// An effect panicked while processing and was permanently bypassed
    EffectFaulted { channel: usize, effect: String },
}

/// Classification for recorded engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ChannelLoad,
    ChannelQueue,
    Playback,
    Effect,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::ChannelLoad => "channel load error",
            ErrorKind::ChannelQueue => "channel queue error",
            ErrorKind::Playback => "playback error",
            ErrorKind::Effect => "effect error",
        };
        f.write_str(label)
    }
}

/// An error recorded by the engine, kept in the error log for diagnosis
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// How many errors the log retains before discarding the oldest
pub const MAX_STORED_ERRORS: usize = 10;

/// Shared ring of the most recent engine errors
///
/// Writable from any thread. Holds at most [`MAX_STORED_ERRORS`] entries,
/// keeping the newest.
#[derive(Default)]
pub struct ErrorLog {
    errors: Mutex<VecDeque<EngineError>>,
}

impl ErrorLog {
    /// Append an error, evicting the oldest entries past the cap
    ///
    /// Effect faults are non-fatal and log at warn; everything else at error.
    pub fn record(&self, error: EngineError) {
        match error.kind {
            ErrorKind::Effect => log::warn!("{}", error),
            _ => log::error!("{}", error),
        }
        let mut errors = lock_unpoisoned(&self.errors);
        errors.push_back(error);
        while errors.len() > MAX_STORED_ERRORS {
            errors.pop_front();
        }
    }

    /// The most recently recorded error
    pub fn last(&self) -> Option<EngineError> {
        lock_unpoisoned(&self.errors).back().cloned()
    }

    /// All retained errors, oldest first
    pub fn all(&self) -> Vec<EngineError> {
        lock_unpoisoned(&self.errors).iter().cloned().collect()
    }
}

/// Engine playback state shared across threads
pub struct EngineState(AtomicU8);

impl EngineState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(PlaybackState::Stopped.code()))
    }

    pub fn get(&self) -> PlaybackState {
        PlaybackState::from_code(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, state: PlaybackState) {
        self.0.store(state.code(), Ordering::Relaxed);
    }
}

/// Called when a channel finishes its source; receives the channel index
pub type EndListener = Box<dyn Fn(usize) + Send>;
/// Called when the engine's playback state changes
pub type PlaybackListener = Box<dyn Fn(PlaybackState) + Send>;
/// Called once per rendered buffer with position and file length in seconds
pub type PositionListener = Box<dyn Fn(f64, f64) + Send>;
/// Called when the engine records an error
pub type ErrorListener = Box<dyn Fn(&EngineError) + Send>;
/// Called with each rendered buffer before it is queued for output
pub type BufferListener = Box<dyn Fn(&StereoBuffer) + Send>;

/// Registered observer callbacks
///
/// One slot per event kind; registering replaces the previous listener.
/// Notification happens on whichever thread raised the event, with no
/// engine locks held.
#[derive(Default)]
pub struct Listeners {
    on_end: Mutex<Option<EndListener>>,
    on_playback: Mutex<Option<PlaybackListener>>,
    on_position: Mutex<Option<PositionListener>>,
    on_error: Mutex<Option<ErrorListener>>,
    on_buffer: Mutex<Option<BufferListener>>,
}

impl Listeners {
    pub(crate) fn set_end(&self, listener: EndListener) {
        *lock_unpoisoned(&self.on_end) = Some(listener);
    }

    pub(crate) fn set_playback(&self, listener: PlaybackListener) {
        *lock_unpoisoned(&self.on_playback) = Some(listener);
    }

    pub(crate) fn set_position(&self, listener: PositionListener) {
        *lock_unpoisoned(&self.on_position) = Some(listener);
    }

    pub(crate) fn set_error(&self, listener: ErrorListener) {
        *lock_unpoisoned(&self.on_error) = Some(listener);
    }

    pub(crate) fn set_buffer(&self, listener: BufferListener) {
        *lock_unpoisoned(&self.on_buffer) = Some(listener);
    }

    pub(crate) fn notify_end(&self, channel: usize) {
        if let Some(listener) = lock_unpoisoned(&self.on_end).as_ref() {
            listener(channel);
        }
    }

    pub(crate) fn notify_playback(&self, state: PlaybackState) {
        if let Some(listener) = lock_unpoisoned(&self.on_playback).as_ref() {
            listener(state);
        }
    }

    pub(crate) fn notify_position(&self, position: f64, length: f64) {
        if let Some(listener) = lock_unpoisoned(&self.on_position).as_ref() {
            listener(position, length);
        }
    }

    pub(crate) fn notify_error(&self, error: &EngineError) {
        if let Some(listener) = lock_unpoisoned(&self.on_error).as_ref() {
            listener(error);
        }
    }

    pub(crate) fn notify_buffer(&self, buffer: &StereoBuffer) {
        if let Some(listener) = lock_unpoisoned(&self.on_buffer).as_ref() {
            listener(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_error_log_keeps_newest() {
        let log = ErrorLog::default();
        for i in 0..12 {
            log.record(EngineError::new(ErrorKind::Playback, format!("error {}", i)));
        }

        let all = log.all();
        assert_eq!(all.len(), MAX_STORED_ERRORS);
        assert_eq!(all[0].message, "error 2");
        assert_eq!(log.last().unwrap().message, "error 11");
    }

    #[test]
    fn test_error_display_includes_kind() {
        let error = EngineError::new(ErrorKind::ChannelLoad, "no such file");
        assert_eq!(error.to_string(), "channel load error: no such file");
    }

    #[test]
    fn test_notify_without_listener_is_quiet() {
        let listeners = Listeners::default();
        listeners.notify_end(0);
        listeners.notify_playback(PlaybackState::Playing);
        listeners.notify_position(1.0, 2.0);
        listeners.notify_buffer(&StereoBuffer::silence(4));
    }

    #[test]
    fn test_listener_receives_arguments() {
        let listeners = Listeners::default();
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let seen_clone = Arc::clone(&seen);
        listeners.set_end(Box::new(move |channel| {
            seen_clone.store(channel, Ordering::SeqCst);
        }));

        listeners.notify_end(3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_registering_replaces_listener() {
        let listeners = Listeners::default();
        let count = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&count);
        listeners.set_end(Box::new(move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        }));
        let second = Arc::clone(&count);
        listeners.set_end(Box::new(move |_| {
            second.fetch_add(10, Ordering::SeqCst);
        }));

        listeners.notify_end(0);
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_engine_state_round_trip() {
        let state = EngineState::new();
        assert_eq!(state.get(), PlaybackState::Stopped);

        state.set(PlaybackState::Playing);
        assert_eq!(state.get(), PlaybackState::Playing);

        state.set(PlaybackState::Paused);
        assert_eq!(state.get(), PlaybackState::Paused);
    }
}
