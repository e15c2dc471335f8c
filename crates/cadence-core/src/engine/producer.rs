//! Producer thread that renders buffers ahead of the device callback
//!
//! The producer owns the writable side of the filled-buffer ring. Each
//! iteration it renders one buffer from its source, mirrors it to the
//! buffer listener, and pushes it. When the ring is full it parks briefly
//! and retries the same buffer. Spent buffers handed back by the device
//! callback are dropped here so the callback never frees memory.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{Receiver, TryRecvError};

use super::events::{
    lock_unpoisoned, EngineError, EngineEvent, EngineState, ErrorKind, ErrorLog, Listeners,
};
use crate::channel::Channel;
use crate::mixer::Mixer;
use crate::types::{PlaybackState, StereoBuffer};

/// What the producer renders from
///
/// A mixer sums all of its channels; a solo source is a single channel
/// with no mixing stage.
#[derive(Clone)]
pub(crate) enum RenderSource {
    Mixer(Arc<Mutex<Mixer>>),
    Solo(Arc<Mutex<Channel>>),
}

/// Everything the producer thread needs, moved into it at spawn
pub(crate) struct ProducerContext {
    pub(crate) source: RenderSource,
    pub(crate) filled: rtrb::Producer<StereoBuffer>,
    pub(crate) recycle: rtrb::Consumer<StereoBuffer>,
    pub(crate) stop_rx: Receiver<()>,
    pub(crate) event_rx: Receiver<EngineEvent>,
    pub(crate) listeners: Arc<Listeners>,
    pub(crate) errors: Arc<ErrorLog>,
    pub(crate) state: Arc<EngineState>,
    pub(crate) buffer_size: usize,
    pub(crate) latency_ms: f64,
}

/// Producer thread body; returns when the stop signal arrives
pub(crate) fn run(mut ctx: ProducerContext) {
    log::debug!("Producer thread started");
    let backoff = Duration::from_millis(ctx.latency_ms.clamp(1.0, 10.0) as u64);
    let mut pending: Option<StereoBuffer> = None;

    loop {
        match ctx.stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        ctx.drain_events();
        while ctx.recycle.pop().is_ok() {}

        let buffer = match pending.take() {
            Some(buffer) => buffer,
            None => ctx.render(),
        };
        if let Err(rtrb::PushError::Full(buffer)) = ctx.filled.push(buffer) {
            pending = Some(buffer);
            std::thread::sleep(backoff);
        }
    }

    log::debug!("Producer thread stopped");
}

impl ProducerContext {
    /// Render one buffer from the source
    ///
    /// While the engine is not playing this produces silence without
    /// touching the source, so a paused engine holds no channel locks.
    fn render(&self) -> StereoBuffer {
        if self.state.get() != PlaybackState::Playing {
            return StereoBuffer::silence(self.buffer_size);
        }

        let buffer = match &self.source {
            RenderSource::Mixer(mixer) => {
                lock_unpoisoned(mixer).get_next_buffer(self.buffer_size)
            }
            RenderSource::Solo(channel) => {
                lock_unpoisoned(channel).get_next_buffer(self.buffer_size)
            }
        };

        self.report_faults();
        self.listeners.notify_buffer(&buffer);
        let (position, length) = self.playhead();
        self.listeners.notify_position(position, length);
        buffer
    }

    /// Raise events for effects that faulted during the last render
    fn report_faults(&self) {
        let faults: Vec<(usize, String)> = match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).take_faulted_effects(),
            RenderSource::Solo(channel) => lock_unpoisoned(channel)
                .take_faulted_effects()
                .into_iter()
                .map(|name| (0, name))
                .collect(),
        };
        for (channel, effect) in faults {
            self.handle_event(EngineEvent::EffectFaulted { channel, effect });
        }
    }

    /// Current playhead of the source, in seconds
    ///
    /// With a mixer this follows the first active channel.
    fn playhead(&self) -> (f64, f64) {
        match &self.source {
            RenderSource::Mixer(mixer) => {
                let mixer = lock_unpoisoned(mixer);
                let index = mixer.get_active_channels().first().copied().unwrap_or(0);
                (mixer.get_pos(index), mixer.get_file_length(index))
            }
            RenderSource::Solo(channel) => {
                let channel = lock_unpoisoned(channel);
                (channel.get_position(), channel.get_file_length())
            }
        }
    }

    fn drain_events(&self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::ChannelEnded { channel } => {
                log::info!("Channel {} finished playback", channel);
                if !self.any_playing() {
                    self.state.set(PlaybackState::Stopped);
                    self.listeners.notify_playback(PlaybackState::Stopped);
                }
                self.listeners.notify_end(channel);
            }
            EngineEvent::EffectFaulted { channel, effect } => {
                let error = EngineError::new(
                    ErrorKind::Effect,
                    format!("Effect '{}' disabled after panic on channel {}", effect, channel),
                );
                self.errors.record(error.clone());
                self.listeners.notify_error(&error);
            }
        }
    }

    fn any_playing(&self) -> bool {
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).is_playing(None),
            RenderSource::Solo(channel) => lock_unpoisoned(channel).is_playing(),
        }
    }
}
