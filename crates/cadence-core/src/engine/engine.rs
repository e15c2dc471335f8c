//! Main playback engine
//!
//! [`AudioEngine`] owns the render source, the producer thread, and the
//! device stream, and exposes the control surface the application calls.
//! Control methods run on the caller's thread; rendering happens on the
//! producer thread; the device callback only copies finished buffers.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};

use super::events::{
    lock_unpoisoned, EngineError, EngineEvent, EngineState, ErrorKind, ErrorLog, Listeners,
};
use super::producer::{self, ProducerContext, RenderSource};
use crate::audio::{open_output_stream, OutputMeter, OutputStream};
use crate::channel::{Channel, MAX_VOLUME_PERCENT};
use crate::config::EngineConfig;
use crate::effect::Effect;
use crate::mixer::Mixer;
use crate::types::{PlaybackState, StereoBuffer};

/// Builds a fresh effect instance
///
/// Effects hold per-channel state, so each channel gets its own instance
/// from the factory rather than sharing one.
pub type EffectFactory = Box<dyn Fn() -> Box<dyn Effect> + Send>;

/// Handle to a running producer thread
struct ProducerHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

/// Real-time playback engine
///
/// Created around either a mixer with dynamically added channels or a
/// single solo channel, per [`EngineConfig::use_mixer`]. Playback does not
/// start until a file loads successfully and [`AudioEngine::play`] is
/// called.
pub struct AudioEngine {
    config: EngineConfig,
    source: RenderSource,
    stream: Option<OutputStream>,
    producer: Option<ProducerHandle>,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
    listeners: Arc<Listeners>,
    errors: Arc<ErrorLog>,
    state: Arc<EngineState>,
    meter: Arc<OutputMeter>,
    effect_factories: Vec<EffectFactory>,
    /// Engine volume as a percentage, 0 to 120
    volume: f32,
    /// Set until a file loads successfully; gates [`AudioEngine::play`]
    do_not_play: bool,
}

impl AudioEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (event_tx, event_rx) = unbounded();
        let volume = config.volume.clamp(0.0, MAX_VOLUME_PERCENT);

        let source = if config.use_mixer {
            let mut mixer = Mixer::new(config.sample_rate, config.buffer_size);
            let tx = event_tx.clone();
            mixer.set_on_channel_end(move |channel| {
                let _ = tx.send(EngineEvent::ChannelEnded { channel });
            });
            RenderSource::Mixer(Arc::new(Mutex::new(mixer)))
        } else {
            let mut channel = Channel::new(config.sample_rate, config.buffer_size);
            channel.effects_mut().set_mode(config.effect_composition);
            channel.set_volume(volume);
            let tx = event_tx.clone();
            channel.set_on_end(move |_| {
                let _ = tx.send(EngineEvent::ChannelEnded { channel: 0 });
            });
            RenderSource::Solo(Arc::new(Mutex::new(channel)))
        };

        Self {
            config,
            source,
            stream: None,
            producer: None,
            event_tx,
            event_rx,
            listeners: Arc::new(Listeners::default()),
            errors: Arc::new(ErrorLog::default()),
            state: Arc::new(EngineState::new()),
            meter: Arc::new(OutputMeter::default()),
            effect_factories: Vec::new(),
            volume,
            do_not_play: true,
        }
    }

    /// Load a file into a channel, replacing whatever it was playing
    ///
    /// With a mixer, missing channels up to `channel` are created first;
    /// `None` targets channel 0. A successful load opens the play gate. A
    /// failed one silences the target channel and closes the gate unless
    /// another channel still has something playable.
    pub fn load_file(&mut self, path: &Path, channel: Option<usize>) -> Result<(), EngineError> {
        log::info!("Loading {:?}", path);
        let result = match &self.source {
            RenderSource::Mixer(mixer) => {
                let index = channel.unwrap_or(0);
                self.ensure_channel(index);
                lock_unpoisoned(mixer).load_file_to_channel(index, path)
            }
            RenderSource::Solo(solo) => lock_unpoisoned(solo).load(path),
        };
        match result {
            Ok(()) => {
                self.do_not_play = false;
                Ok(())
            }
            Err(e) => {
                self.do_not_play = !self.has_playable_source();
                Err(self.report_error(ErrorKind::ChannelLoad, e.to_string()))
            }
        }
    }

    /// Queue a file to start gaplessly when the current one ends
    ///
    /// A queue failure leaves the current file and the play gate untouched.
    pub fn queue_file(&self, path: &Path, channel: Option<usize>) -> Result<(), EngineError> {
        log::info!("Queueing {:?}", path);
        let result = match &self.source {
            RenderSource::Mixer(mixer) => {
                let index = channel.unwrap_or(0);
                self.ensure_channel(index);
                lock_unpoisoned(mixer).queue_to_channel(index, path)
            }
            RenderSource::Solo(solo) => lock_unpoisoned(solo).queue(path),
        };
        result.map_err(|e| self.report_error(ErrorKind::ChannelQueue, e.to_string()))
    }

    /// Start playback
    ///
    /// Restarts the output stream, then activates the target channel.
    /// With a mixer and `channel: None`, every loaded channel starts.
    /// Blocked until a file has loaded successfully.
    pub fn play(&mut self, channel: Option<usize>) -> Result<(), EngineError> {
        if self.do_not_play {
            return Err(self.report_error(
                ErrorKind::Playback,
                "Playback blocked: no playable file loaded",
            ));
        }

        self.start_stream()?;

        match &self.source {
            RenderSource::Mixer(mixer) => {
                let mixer = lock_unpoisoned(mixer);
                match channel {
                    Some(index) => {
                        if !mixer.play_channel(index) {
                            log::warn!("Channel {} has nothing playable", index);
                        }
                    }
                    None => {
                        for index in mixer.get_loaded_channels() {
                            mixer.play_channel(index);
                        }
                    }
                }
            }
            RenderSource::Solo(solo) => lock_unpoisoned(solo).play(),
        }

        self.state.set(PlaybackState::Playing);
        self.listeners.notify_playback(PlaybackState::Playing);
        Ok(())
    }

    /// Open the device stream with a fresh producer thread
    ///
    /// Tears down any previous stream first. The producer gets a head
    /// start so the queue is full before the device begins pulling.
    pub fn start_stream(&mut self) -> Result<(), EngineError> {
        self.shutdown();

        let (filled_tx, filled_rx) = rtrb::RingBuffer::new(self.config.queue_capacity);
        let (recycle_tx, recycle_rx) = rtrb::RingBuffer::new(self.config.queue_capacity + 2);
        let (stop_tx, stop_rx) = bounded(1);

        let ctx = ProducerContext {
            source: self.source.clone(),
            filled: filled_tx,
            recycle: recycle_rx,
            stop_rx,
            event_rx: self.event_rx.clone(),
            listeners: Arc::clone(&self.listeners),
            errors: Arc::clone(&self.errors),
            state: Arc::clone(&self.state),
            buffer_size: self.config.buffer_size,
            latency_ms: self.latency_ms(),
        };
        let join = std::thread::Builder::new()
            .name("cadence-producer".to_string())
            .spawn(move || producer::run(ctx))
            .map_err(|e| {
                self.report_error(
                    ErrorKind::Playback,
                    format!("Could not start producer thread: {}", e),
                )
            })?;
        self.producer = Some(ProducerHandle { stop_tx, join });

        std::thread::sleep(Duration::from_millis(self.config.startup_delay_ms));

        match open_output_stream(
            self.config.device.as_deref(),
            self.config.sample_rate,
            self.config.buffer_size as u32,
            filled_rx,
            recycle_tx,
            Arc::clone(&self.meter),
        ) {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.stop_producer();
                Err(self.report_error(ErrorKind::Playback, e.to_string()))
            }
        }
    }

    /// Pause playback; `None` pauses everything and marks the engine paused
    pub fn pause(&self, channel: Option<usize>) {
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).pause(channel),
            RenderSource::Solo(solo) => lock_unpoisoned(solo).pause(),
        }
        if channel.is_none() {
            self.state.set(PlaybackState::Paused);
            self.listeners.notify_playback(PlaybackState::Paused);
        }
    }

    /// Resume paused playback; `None` resumes everything
    pub fn resume(&self, channel: Option<usize>) {
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).resume(channel),
            RenderSource::Solo(solo) => lock_unpoisoned(solo).resume(),
        }
        if channel.is_none() {
            self.state.set(PlaybackState::Playing);
            self.listeners.notify_playback(PlaybackState::Playing);
        }
    }

    /// Stop all channels, optionally tearing the stream down too
    pub fn stop(&mut self, shutdown: bool) {
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).stop(),
            RenderSource::Solo(solo) => lock_unpoisoned(solo).stop(),
        }
        self.state.set(PlaybackState::Stopped);
        self.listeners.notify_playback(PlaybackState::Stopped);
        if shutdown {
            self.shutdown();
        }
    }

    /// Stop the device stream and the producer thread
    ///
    /// Safe to call repeatedly or when nothing is running.
    pub fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            log::info!("Audio stream stopped");
        }
        self.stop_producer();
    }

    fn stop_producer(&mut self) {
        if let Some(handle) = self.producer.take() {
            let _ = handle.stop_tx.send(());
            if handle.join.join().is_err() {
                log::warn!("Producer thread panicked");
            }
        }
    }

    /// Set the engine volume as a percentage, clamped to 0..=120
    ///
    /// `None` applies to every channel; with a mixer, `Some` targets one
    /// channel but still becomes the default for channels created later.
    pub fn set_volume(&mut self, percent: f32, channel: Option<usize>) {
        let percent = percent.clamp(0.0, MAX_VOLUME_PERCENT);
        self.volume = percent;
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).set_volume(percent, channel),
            RenderSource::Solo(solo) => lock_unpoisoned(solo).set_volume(percent),
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Playhead position in seconds; `None` reads channel 0
    pub fn get_pos(&self, channel: Option<usize>) -> f64 {
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).get_pos(channel.unwrap_or(0)),
            RenderSource::Solo(solo) => lock_unpoisoned(solo).get_position(),
        }
    }

    /// Loaded file length in seconds; `None` reads channel 0
    pub fn get_file_length(&self, channel: Option<usize>) -> f64 {
        match &self.source {
            RenderSource::Mixer(mixer) => {
                lock_unpoisoned(mixer).get_file_length(channel.unwrap_or(0))
            }
            RenderSource::Solo(solo) => lock_unpoisoned(solo).get_file_length(),
        }
    }

    /// Seek to a position in seconds; `None` targets channel 0
    pub fn set_position(&self, seconds: f64, channel: Option<usize>) {
        match &self.source {
            RenderSource::Mixer(mixer) => {
                let handle = lock_unpoisoned(mixer).channel(channel.unwrap_or(0));
                if let Some(handle) = handle {
                    lock_unpoisoned(&handle).set_position(seconds);
                }
            }
            RenderSource::Solo(solo) => lock_unpoisoned(solo).set_position(seconds),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.get() == PlaybackState::Playing
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.get()
    }

    /// Handle to a channel for direct control (fades, looping, pan)
    pub fn channel(&self, index: usize) -> Option<Arc<Mutex<Channel>>> {
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).channel(index),
            RenderSource::Solo(solo) => (index == 0).then(|| Arc::clone(solo)),
        }
    }

    pub fn channel_count(&self) -> usize {
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).channel_count(),
            RenderSource::Solo(_) => 1,
        }
    }

    /// Close every channel; with a mixer the channels are removed
    pub fn clear_channels(&self) {
        match &self.source {
            RenderSource::Mixer(mixer) => lock_unpoisoned(mixer).clear_channels(),
            RenderSource::Solo(solo) => lock_unpoisoned(solo).close(),
        }
    }

    /// Register an effect applied to every current and future channel
    ///
    /// The factory runs once per channel so effect state is never shared.
    pub fn add_effect(&mut self, factory: impl Fn() -> Box<dyn Effect> + Send + 'static) {
        let factory: EffectFactory = Box::new(factory);
        match &self.source {
            RenderSource::Mixer(mixer) => {
                let mixer = lock_unpoisoned(mixer);
                for index in 0..mixer.channel_count() {
                    if let Some(handle) = mixer.channel(index) {
                        lock_unpoisoned(&handle).add_effect(factory());
                    }
                }
            }
            RenderSource::Solo(solo) => {
                lock_unpoisoned(solo).add_effect(factory());
            }
        }
        self.effect_factories.push(factory);
    }

    /// Called when a channel finishes its source, with the channel index
    pub fn register_end_event(&self, listener: impl Fn(usize) + Send + 'static) {
        self.listeners.set_end(Box::new(listener));
    }

    /// Called when the engine's playback state changes
    pub fn register_playback_event(&self, listener: impl Fn(PlaybackState) + Send + 'static) {
        self.listeners.set_playback(Box::new(listener));
    }

    /// Called once per rendered buffer with (position, file length) in seconds
    pub fn register_position_event(&self, listener: impl Fn(f64, f64) + Send + 'static) {
        self.listeners.set_position(Box::new(listener));
    }

    /// Called whenever the engine records an error
    pub fn register_error_event(&self, listener: impl Fn(&EngineError) + Send + 'static) {
        self.listeners.set_error(Box::new(listener));
    }

    /// Called with each rendered buffer, on the producer thread
    pub fn register_buffer_event(&self, listener: impl Fn(&StereoBuffer) + Send + 'static) {
        self.listeners.set_buffer(Box::new(listener));
    }

    pub fn last_error(&self) -> Option<EngineError> {
        self.errors.last()
    }

    /// Retained errors, oldest first
    pub fn errors(&self) -> Vec<EngineError> {
        self.errors.all()
    }

    /// Smoothed output levels per side, linear 0.0 to 1.0
    pub fn output_levels(&self) -> (f32, f32) {
        self.meter.levels()
    }

    pub fn output_peak(&self) -> f32 {
        self.meter.peak()
    }

    /// Total frames the device has pulled since the engine was created
    pub fn frames_played(&self) -> u64 {
        self.meter.frames_played()
    }

    pub fn is_stream_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Duration of one buffer in milliseconds
    pub fn latency_ms(&self) -> f64 {
        self.config.buffer_size as f64 * 1000.0 / self.config.sample_rate as f64
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create mixer channels up to and including `index`
    ///
    /// New channels inherit the composition mode, the engine volume, and
    /// one instance of every registered effect.
    fn ensure_channel(&self, index: usize) {
        if let RenderSource::Mixer(mixer) = &self.source {
            let mut mixer = lock_unpoisoned(mixer);
            while mixer.channel_count() <= index {
                let new_index = mixer.add_channel();
                if let Some(handle) = mixer.channel(new_index) {
                    let mut channel = lock_unpoisoned(&handle);
                    channel.effects_mut().set_mode(self.config.effect_composition);
                    channel.set_volume(self.volume);
                    for factory in &self.effect_factories {
                        channel.add_effect(factory());
                    }
                }
            }
        }
    }

    /// True when some channel still holds a playable source
    fn has_playable_source(&self) -> bool {
        match &self.source {
            RenderSource::Mixer(mixer) => !lock_unpoisoned(mixer).get_loaded_channels().is_empty(),
            RenderSource::Solo(solo) => {
                let solo = lock_unpoisoned(solo);
                solo.has_source() && !solo.is_unplayable()
            }
        }
    }

    fn report_error(&self, kind: ErrorKind, message: impl Into<String>) -> EngineError {
        let error = EngineError::new(kind, message);
        self.errors.record(error.clone());
        self.listeners.notify_error(&error);
        error
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
