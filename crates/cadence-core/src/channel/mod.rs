//! Channel - per-source streaming playback state machine
//!
//! A [`Channel`] owns up to two decoder handles: the current source and an
//! optional pre-queued next source for gapless transitions. Each call to
//! [`get_next_buffer`](Channel::get_next_buffer) pulls native frames from
//! the current source, expands mono to stereo, resamples to the engine
//! rate, and applies volume, the fade envelope, and the effect stage. On
//! exhaustion the channel loops, promotes the queued source, or drains and
//! fires its end-of-playback callback exactly once.
//!
//! Buffer production never fails: every call returns exactly the requested
//! frame count, silence in the worst case.

mod fade;

pub use fade::{FadeCurve, FadeEnvelope};

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::decode::{self, AudioSource, DecodeError};
use crate::effect::{Effect, EffectStage};
use crate::resample::{ResampleError, ResampleRatio, StreamResampler};
use crate::types::{PlaybackState, Sample, StereoBuffer, StereoSample};

/// Fade-in window armed by `load` when fade-on-load is enabled, in ms
pub const LOAD_FADE_MS: u64 = 2000;

/// Upper bound for volume percent (120 = +20% boost over unity)
pub const MAX_VOLUME_PERCENT: f32 = 120.0;

/// Errors from loading or queueing a source
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to load source: {0}")]
    Load(DecodeError),

    #[error("Failed to queue source: {0}")]
    Queue(DecodeError),

    #[error("Resampler setup failed: {0}")]
    Resample(#[from] ResampleError),

    #[error("No channel at index {0}")]
    NoSuchChannel(usize),
}

/// End-of-playback callback installed by the channel's owner
pub type EndCallback = Box<dyn FnMut(&mut Channel) + Send>;

/// Lock-free playback state for reads outside the channel lock
///
/// The producer thread updates these atomics during buffer production;
/// listeners and UI code read them without blocking it. All operations
/// use `Ordering::Relaxed` since only visibility is needed.
pub struct ChannelAtomics {
    /// Playhead position in native frames of the current source
    position: AtomicU64,
    /// Total length of the current source in native frames
    duration_frames: AtomicU64,
    /// Native sample rate of the current source (0 when nothing is loaded)
    native_rate: AtomicU32,
    /// Playback state code (see [`PlaybackState::code`])
    state: AtomicU8,
}

impl ChannelAtomics {
    fn new() -> Self {
        Self {
            position: AtomicU64::new(0),
            duration_frames: AtomicU64::new(0),
            native_rate: AtomicU32::new(0),
            state: AtomicU8::new(PlaybackState::Stopped.code()),
        }
    }

    /// Playhead position in native frames (lock-free)
    #[inline]
    pub fn position_frames(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Playhead position in seconds (lock-free)
    #[inline]
    pub fn position_seconds(&self) -> f64 {
        let rate = self.native_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return 0.0;
        }
        self.position.load(Ordering::Relaxed) as f64 / rate as f64
    }

    /// Length of the current source in seconds (lock-free)
    #[inline]
    pub fn duration_seconds(&self) -> f64 {
        let rate = self.native_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return 0.0;
        }
        self.duration_frames.load(Ordering::Relaxed) as f64 / rate as f64
    }

    /// Current playback state (lock-free)
    #[inline]
    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_code(self.state.load(Ordering::Relaxed))
    }

    /// Check if playing (lock-free)
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }
}

impl Default for ChannelAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// An open decoder handle plus the conversion state bound to its native rate
struct SourceState {
    source: Box<dyn AudioSource>,
    mono: bool,
    ratio: ResampleRatio,
    resampler: Option<StreamResampler>,
}

impl SourceState {
    /// Wrap a source, computing resample factors against the target rate
    ///
    /// The resampler is built eagerly so a gapless promotion on the
    /// producer thread never pays filter construction cost.
    fn new(
        source: Box<dyn AudioSource>,
        target_rate: u32,
        chunk: usize,
    ) -> Result<Self, ResampleError> {
        let mono = source.channels() == 1;
        let native = source.sample_rate();
        let ratio = ResampleRatio::new(target_rate, native);
        let resampler = if ratio.is_unity() {
            None
        } else {
            log::info!(
                "Source rate {} differs from target {}, resampling at {}/{}",
                native,
                target_rate,
                ratio.up,
                ratio.down
            );
            Some(StreamResampler::new(ratio, chunk)?)
        };
        Ok(Self {
            source,
            mono,
            ratio,
            resampler,
        })
    }
}

/// One playable source with gapless queueing, fades, and an effect stage
///
/// All mutating methods take `&mut self`; owners that share a channel
/// across threads wrap it in a mutex, so mutation and buffer production
/// never interleave.
pub struct Channel {
    /// Output rate every produced buffer is at
    target_sample_rate: u32,
    /// Preferred block size; also the resampler output chunk
    buffer_size: usize,
    current: Option<SourceState>,
    next: Option<SourceState>,
    playing: bool,
    paused: bool,
    looping: bool,
    /// Set when the last load failed; play refuses until a successful load
    unplayable: bool,
    /// Gain as a fraction (percent / 100)
    volume: f32,
    /// Stereo pan position, reserved
    pan: f32,
    fade: FadeEnvelope,
    /// Arm a fade-in window on every successful load
    fade_on_load: bool,
    effects: EffectStage,
    /// Names of effects that faulted since the last drain
    faulted_effects: Vec<String>,
    on_end: Option<EndCallback>,
    atomics: Arc<ChannelAtomics>,
    /// Resampled frames beyond the requested count, consumed next call
    carry: StereoBuffer,
    /// Interleaved decode scratch
    read_buf: Vec<Sample>,
    /// Stereo-expanded scratch
    convert_buf: Vec<StereoSample>,
}

impl Channel {
    /// Create a channel producing buffers at the given rate and block size
    pub fn new(target_sample_rate: u32, buffer_size: usize) -> Self {
        Self {
            target_sample_rate,
            buffer_size,
            current: None,
            next: None,
            playing: false,
            paused: false,
            looping: false,
            unplayable: false,
            volume: 0.5,
            pan: 0.0,
            fade: FadeEnvelope::default(),
            fade_on_load: false,
            effects: EffectStage::default(),
            faulted_effects: Vec::new(),
            on_end: None,
            atomics: Arc::new(ChannelAtomics::new()),
            carry: StereoBuffer::with_capacity(buffer_size),
            read_buf: Vec::new(),
            convert_buf: Vec::new(),
        }
    }

    /// Get a reference to the lock-free atomic state
    pub fn atomics(&self) -> Arc<ChannelAtomics> {
        Arc::clone(&self.atomics)
    }

    #[inline]
    fn sync_state_atomic(&self) {
        let state = if !self.playing {
            PlaybackState::Stopped
        } else if self.paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
        self.atomics.state.store(state.code(), Ordering::Relaxed);
    }

    #[inline]
    fn sync_position_atomic(&self) {
        let position = self
            .current
            .as_ref()
            .map(|c| c.source.position_frames())
            .unwrap_or(0);
        self.atomics.position.store(position, Ordering::Relaxed);
    }

    #[inline]
    fn sync_source_atomics(&self) {
        let (duration, rate) = match &self.current {
            Some(c) => (c.source.frames_total(), c.source.sample_rate()),
            None => (0, 0),
        };
        self.atomics.duration_frames.store(duration, Ordering::Relaxed);
        self.atomics.native_rate.store(rate, Ordering::Relaxed);
        self.sync_position_atomic();
        self.sync_state_atomic();
    }

    // --- Source management ---

    /// Load a new current source, closing any prior one
    ///
    /// On failure the channel is left without a source and marked
    /// unplayable, so buffer production yields silence until a load
    /// succeeds.
    pub fn load(&mut self, path: &Path) -> Result<(), ChannelError> {
        self.current = None;
        self.unplayable = true;
        self.carry.clear();

        let result = decode::open_source(path)
            .map_err(ChannelError::Load)
            .and_then(|source| {
                SourceState::new(source, self.target_sample_rate, self.buffer_size)
                    .map_err(ChannelError::Resample)
            });

        match result {
            Ok(state) => {
                self.current = Some(state);
                self.unplayable = false;
                if self.fade_on_load {
                    self.fade.start_fade_in(self.ms_to_samples(LOAD_FADE_MS));
                } else {
                    self.fade.clear_fade_in();
                }
                // A new program starts with clean effect tails
                self.effects.reset_all();
                self.sync_source_atomics();
                Ok(())
            }
            Err(e) => {
                log::warn!("Channel load failed: {}", e);
                self.sync_source_atomics();
                Err(e)
            }
        }
    }

    /// Queue the next source for gapless continuation
    ///
    /// Never disturbs the current source; failure clears any stale queued
    /// source and returns the error.
    pub fn queue(&mut self, path: &Path) -> Result<(), ChannelError> {
        self.next = None;

        let source = decode::open_source(path).map_err(ChannelError::Queue)?;
        let state = SourceState::new(source, self.target_sample_rate, self.buffer_size)?;
        self.next = Some(state);
        Ok(())
    }

    /// True when a current source is loaded
    pub fn has_source(&self) -> bool {
        self.current.is_some()
    }

    /// True when the last load failed and play is refused
    pub fn is_unplayable(&self) -> bool {
        self.unplayable
    }

    // --- Playback controls ---

    /// Start or resume playback; refused without a loaded, playable source
    pub fn play(&mut self) {
        if self.current.is_some() && !self.unplayable {
            self.playing = true;
            self.paused = false;
            self.sync_state_atomic();
        }
    }

    /// Pause buffer production without releasing the source
    pub fn pause(&mut self) {
        self.paused = true;
        self.sync_state_atomic();
    }

    /// Resume from pause
    pub fn resume(&mut self) {
        self.paused = false;
        self.sync_state_atomic();
    }

    /// Stop playback and close the current source; a queued next survives
    pub fn stop(&mut self) {
        self.playing = false;
        self.current = None;
        self.carry.clear();
        self.sync_source_atomics();
    }

    /// Release both decoder handles
    pub fn close(&mut self) {
        self.playing = false;
        self.current = None;
        self.next = None;
        self.carry.clear();
        self.sync_source_atomics();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Restart the source from the beginning when it runs out
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    // --- Volume / pan / position ---

    /// Set volume as a percent, clamped to 0..=120
    pub fn set_volume(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, MAX_VOLUME_PERCENT);
        self.volume = percent / 100.0;
    }

    /// Current gain as a fraction (1.0 = unity)
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the stereo pan position in -1..=1 (reserved)
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Seek the current source; out-of-range positions are ignored
    pub fn set_position(&mut self, seconds: f64) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        let frame = (seconds.max(0.0) * current.source.sample_rate() as f64) as u64;
        match current.source.seek(frame) {
            Ok(()) => {
                if let Some(resampler) = current.resampler.as_mut() {
                    resampler.reset();
                }
                self.carry.clear();
                self.sync_position_atomic();
            }
            Err(e) => log::debug!("Seek to {:.2}s ignored: {}", seconds, e),
        }
    }

    /// Playhead position in seconds of the current source
    pub fn get_position(&self) -> f64 {
        match &self.current {
            Some(c) => c.source.position_frames() as f64 / c.source.sample_rate() as f64,
            None => 0.0,
        }
    }

    /// Length of the current source in seconds
    pub fn get_file_length(&self) -> f64 {
        match &self.current {
            Some(c) => c.source.frames_total() as f64 / c.source.sample_rate() as f64,
            None => 0.0,
        }
    }

    /// One output block's duration in milliseconds
    pub fn latency_ms(&self) -> f64 {
        self.buffer_size as f64 * 1000.0 / self.target_sample_rate as f64
    }

    // --- Fades ---

    /// Arm a fade-in window starting at the next produced buffer
    pub fn start_fade_in(&mut self, duration_ms: u64) {
        let window = self.ms_to_samples(duration_ms);
        self.fade.start_fade_in(window);
    }

    /// Arm a fade-out window; its completion stops the channel
    pub fn start_fade_out(&mut self, duration_ms: u64) {
        let window = self.ms_to_samples(duration_ms);
        self.fade.start_fade_out(window);
    }

    pub fn set_fade_curve(&mut self, curve: FadeCurve) {
        self.fade.set_curve(curve);
    }

    /// Arm a [`LOAD_FADE_MS`] fade-in on each successful load
    pub fn set_fade_on_load(&mut self, enabled: bool) {
        self.fade_on_load = enabled;
    }

    fn ms_to_samples(&self, ms: u64) -> u64 {
        ms * self.target_sample_rate as u64 / 1000
    }

    // --- Effects ---

    /// Append an effect to this channel's stage
    pub fn add_effect(&mut self, effect: Box<dyn Effect>) {
        self.effects.add(effect);
    }

    pub fn effects(&self) -> &EffectStage {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectStage {
        &mut self.effects
    }

    /// Drain the names of effects that faulted since the last call
    pub fn take_faulted_effects(&mut self) -> Vec<String> {
        std::mem::take(&mut self.faulted_effects)
    }

    /// Install the end-of-playback callback
    pub fn set_on_end(&mut self, callback: impl FnMut(&mut Channel) + Send + 'static) {
        self.on_end = Some(Box::new(callback));
    }

    // --- Buffer production ---

    /// Produce exactly `frame_count` output frames
    ///
    /// Returns silence when stopped, paused, or without a source. Never
    /// returns an error and never panics across this boundary; decode and
    /// resample failures degrade to end-of-stream handling.
    pub fn get_next_buffer(&mut self, frame_count: usize) -> StereoBuffer {
        if !self.playing || self.paused || self.current.is_none() {
            return StereoBuffer::silence(frame_count);
        }

        let mut out = StereoBuffer::with_capacity(frame_count + self.buffer_size);

        // Overflow frames from the previous call come first
        if !self.carry.is_empty() && out.len() < frame_count {
            let take = self.carry.len().min(frame_count);
            let drained = self.carry.drain_front(take);
            out.extend_from_slice(&drained);
        }

        while out.len() < frame_count {
            let needed = frame_count - out.len();
            if !self.read_chunk(needed, &mut out) {
                if !self.advance_source(&mut out) {
                    break;
                }
            }
        }

        // A drained source pads the remainder with silence
        if out.len() < frame_count {
            out.resize(frame_count);
        }
        // A resampler chunk may overshoot; the excess carries over unscaled
        if out.len() > frame_count {
            self.carry.extend_from_slice(&out.as_slice()[frame_count..]);
            out.truncate(frame_count);
        }

        out.scale(self.volume);
        if self.fade.apply(&mut out) {
            // A consumed fade-out window stops the channel
            self.playing = false;
            self.sync_state_atomic();
        }

        let faults = self.effects.process(&mut out);
        self.faulted_effects.extend(faults);

        self.sync_position_atomic();
        out
    }

    /// Pull one chunk from the current source into `out`
    ///
    /// Returns false at end-of-stream (or on a resample failure, which is
    /// treated the same way).
    fn read_chunk(&mut self, needed: usize, out: &mut StereoBuffer) -> bool {
        let Some(current) = self.current.as_mut() else {
            return false;
        };

        let in_needed = match &current.resampler {
            Some(resampler) => resampler.input_frames_next(),
            None => needed,
        };
        let frames_read = current.source.read(in_needed, &mut self.read_buf);
        if frames_read == 0 {
            return false;
        }

        expand_frames(
            &self.read_buf,
            current.source.channels() as usize,
            &mut self.convert_buf,
        );

        match current.resampler.as_mut() {
            None => out.extend_from_slice(&self.convert_buf),
            Some(resampler) => {
                // A short read is the source's final partial chunk
                let result = if frames_read == in_needed {
                    resampler.process_into(&self.convert_buf, out)
                } else {
                    resampler.flush_into(&self.convert_buf, out)
                };
                if let Err(e) = result {
                    log::error!("Resampling failed mid-stream: {}", e);
                    return false;
                }
            }
        }
        true
    }

    /// Handle end-of-stream on the current source
    ///
    /// Returns false when playback ends here (no loop, nothing queued);
    /// the end-of-playback callback has then fired exactly once.
    fn advance_source(&mut self, out: &mut StereoBuffer) -> bool {
        // Flush the resampler tail before switching or stopping
        if let Some(current) = self.current.as_mut() {
            if let Some(resampler) = current.resampler.as_mut() {
                if let Err(e) = resampler.flush_into(&[], out) {
                    log::error!("Resampler flush failed: {}", e);
                }
            }
        }

        if self.looping && self.rewind_current() {
            return true;
        }

        if let Some(next) = self.next.take() {
            self.current = Some(next);
            self.sync_source_atomics();
            return true;
        }

        self.current = None;
        self.playing = false;
        self.sync_source_atomics();
        self.fire_end_callback();
        false
    }

    fn rewind_current(&mut self) -> bool {
        let Some(current) = self.current.as_mut() else {
            return false;
        };
        if let Err(e) = current.source.seek(0) {
            log::warn!("Loop seek failed: {}", e);
            return false;
        }
        if let Some(resampler) = current.resampler.as_mut() {
            resampler.reset();
        }
        true
    }

    fn fire_end_callback(&mut self) {
        if let Some(mut callback) = self.on_end.take() {
            callback(self);
            self.on_end = Some(callback);
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new(
            crate::types::DEFAULT_SAMPLE_RATE,
            crate::types::DEFAULT_BUFFER_SIZE,
        )
    }
}

/// Expand interleaved source frames to stereo samples
///
/// Mono duplicates into both channels; sources with more than two
/// channels contribute their first two.
fn expand_frames(interleaved: &[Sample], channels: usize, out: &mut Vec<StereoSample>) {
    out.clear();
    match channels {
        0 => {}
        1 => out.extend(interleaved.iter().map(|&s| StereoSample::mono(s))),
        n => out.extend(
            interleaved
                .chunks_exact(n)
                .map(|frame| StereoSample::new(frame[0], frame[1])),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    fn write_constant_wav(
        dir: &tempfile::TempDir,
        name: &str,
        rate: u32,
        channels: u16,
        frames: usize,
        value: f32,
    ) -> PathBuf {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let path = dir.path().join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..frames {
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_silence_without_source() {
        let mut channel = Channel::new(44100, 512);
        let buffer = channel.get_next_buffer(512);
        assert_eq!(buffer.len(), 512);
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_load_failure_marks_unplayable() {
        let mut channel = Channel::new(44100, 512);
        let err = channel.load(Path::new("/nonexistent/missing.wav"));
        assert!(matches!(err, Err(ChannelError::Load(_))));
        assert!(channel.is_unplayable());
        assert!(!channel.has_source());

        channel.play();
        assert!(!channel.is_playing());
        assert_eq!(channel.get_next_buffer(512).peak(), 0.0);
    }

    #[test]
    fn test_exact_frame_count_and_single_end_event() {
        let dir = tempfile::tempdir().unwrap();
        // One second of constant signal: 86 full buffers plus 68 frames
        let path = write_constant_wav(&dir, "one_sec.wav", 44100, 1, 44100, 0.5);

        let mut channel = Channel::new(44100, 512);
        let ends = Arc::new(AtomicUsize::new(0));
        let ends_seen = Arc::clone(&ends);
        channel.set_on_end(move |_| {
            ends_seen.fetch_add(1, Ordering::SeqCst);
        });
        channel.load(&path).unwrap();
        channel.set_volume(100.0);
        channel.play();

        for call in 0..172 {
            let buffer = channel.get_next_buffer(512);
            assert_eq!(buffer.len(), 512);
            if call < 86 {
                // Mono expansion and unity gain leave the value untouched
                assert_eq!(buffer[0].left, 0.5, "call {}", call);
                assert_eq!(buffer[0].right, 0.5, "call {}", call);
            }
            if call > 86 {
                assert_eq!(buffer.peak(), 0.0, "call {}", call);
            }
        }

        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert!(!channel.is_playing());
    }

    #[test]
    fn test_gapless_promotion_has_no_silent_frames() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_constant_wav(&dir, "first.wav", 44100, 2, 700, 0.25);
        let second = write_constant_wav(&dir, "second.wav", 44100, 2, 1000, 0.5);

        let mut channel = Channel::new(44100, 512);
        channel.load(&first).unwrap();
        channel.queue(&second).unwrap();
        channel.set_volume(100.0);
        channel.play();

        let one = channel.get_next_buffer(512);
        assert_eq!(one[0].left, 0.25);

        // The old source ends 188 frames in; the next begins on frame 189
        let two = channel.get_next_buffer(512);
        assert_eq!(two[187].left, 0.25);
        assert_eq!(two[188].left, 0.5);
        assert!(two.iter().all(|s| s.left > 0.0), "silent frame at the seam");
        assert!(channel.is_playing());
    }

    #[test]
    fn test_queue_failure_keeps_current_and_clears_next() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "only.wav", 44100, 2, 600, 0.25);

        let mut channel = Channel::new(44100, 512);
        channel.load(&path).unwrap();
        channel.queue(&path).unwrap();

        let err = channel.queue(Path::new("/nonexistent/next.wav"));
        assert!(matches!(err, Err(ChannelError::Queue(_))));

        channel.set_volume(100.0);
        channel.play();
        let buffer = channel.get_next_buffer(512);
        assert_eq!(buffer[0].left, 0.25);
        // Exhaustion finds no queued source and stops
        channel.get_next_buffer(512);
        assert!(!channel.is_playing());
    }

    #[test]
    fn test_resampled_source_produces_expected_length() {
        let dir = tempfile::tempdir().unwrap();
        // One second at half the target rate: upsampled 2x to 44100 frames
        let path = write_constant_wav(&dir, "half_rate.wav", 22050, 1, 22050, 0.5);

        let mut channel = Channel::new(44100, 512);
        let ends = Arc::new(AtomicUsize::new(0));
        let ends_seen = Arc::clone(&ends);
        channel.set_on_end(move |_| {
            ends_seen.fetch_add(1, Ordering::SeqCst);
        });
        channel.load(&path).unwrap();
        channel.set_volume(100.0);
        channel.play();

        // ceil(44100 / 512) = 87 calls drain the stream exactly
        for _ in 0..86 {
            let buffer = channel.get_next_buffer(512);
            assert_eq!(buffer.len(), 512);
        }
        assert_eq!(ends.load(Ordering::SeqCst), 0);
        let last = channel.get_next_buffer(512);
        assert_eq!(last.len(), 512);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert!(!channel.is_playing());
    }

    #[test]
    fn test_looping_never_drains() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "loop.wav", 44100, 2, 600, 0.25);

        let mut channel = Channel::new(44100, 512);
        channel.load(&path).unwrap();
        channel.set_looping(true);
        channel.set_volume(100.0);
        channel.play();

        for _ in 0..8 {
            let buffer = channel.get_next_buffer(512);
            assert!(buffer.iter().all(|s| s.left == 0.25));
        }
        assert!(channel.is_playing());
    }

    #[test]
    fn test_fade_in_silences_then_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "fade.wav", 44100, 2, 44100, 0.5);

        let mut channel = Channel::new(44100, 512);
        channel.load(&path).unwrap();
        channel.set_volume(100.0);
        channel.set_fade_curve(FadeCurve::Linear);
        channel.start_fade_in(50); // 2205 samples, consumed within 5 buffers
        channel.play();

        let first = channel.get_next_buffer(512);
        assert_eq!(first.peak(), 0.0);

        for _ in 0..4 {
            channel.get_next_buffer(512);
        }
        // Window consumed: output back at full level
        let after = channel.get_next_buffer(512);
        assert_eq!(after[0].left, 0.5);
    }

    #[test]
    fn test_fade_out_completion_stops_playback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "fadeout.wav", 44100, 2, 44100, 0.5);

        let mut channel = Channel::new(44100, 512);
        channel.load(&path).unwrap();
        channel.set_volume(100.0);
        channel.play();

        channel.start_fade_out(10); // 441 samples, inside one buffer
        channel.get_next_buffer(512);
        assert!(!channel.is_playing());
        assert_eq!(channel.get_next_buffer(512).peak(), 0.0);
    }

    #[test]
    fn test_volume_percent_clamped() {
        let mut channel = Channel::new(44100, 512);
        channel.set_volume(150.0);
        assert_eq!(channel.volume(), 1.2);

        channel.set_volume(-10.0);
        assert_eq!(channel.volume(), 0.0);
    }

    #[test]
    fn test_pause_produces_silence_but_stays_active() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "pause.wav", 44100, 2, 44100, 0.5);

        let mut channel = Channel::new(44100, 512);
        channel.load(&path).unwrap();
        channel.set_volume(100.0);
        channel.play();
        channel.pause();

        assert!(channel.is_playing());
        assert!(channel.is_paused());
        assert_eq!(channel.get_next_buffer(512).peak(), 0.0);

        channel.resume();
        assert_eq!(channel.get_next_buffer(512)[0].left, 0.5);
    }

    #[test]
    fn test_atomics_track_position_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "atomics.wav", 44100, 2, 44100, 0.5);

        let mut channel = Channel::new(44100, 512);
        let atomics = channel.atomics();
        channel.load(&path).unwrap();
        assert_eq!(atomics.duration_seconds(), 1.0);
        assert_eq!(atomics.state(), PlaybackState::Stopped);

        channel.play();
        assert_eq!(atomics.state(), PlaybackState::Playing);

        channel.get_next_buffer(512);
        assert_eq!(atomics.position_frames(), 512);
    }
}
