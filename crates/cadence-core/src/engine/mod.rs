//! Playback engine
//!
//! The engine splits work across three threads. The caller's thread runs
//! the control surface (load, play, volume, seeks). A producer thread
//! renders buffers from the mixer or solo channel into a lock-free ring.
//! The device callback pops finished buffers and copies samples out,
//! never locking, allocating, or running user callbacks.

mod engine;
mod events;
mod producer;

pub use engine::{AudioEngine, EffectFactory};
pub use events::{EngineError, ErrorKind, MAX_STORED_ERRORS};
