//! Mixer - sums channel outputs into a single master buffer
//!
//! Features:
//! - Dynamic channel list, each independently loadable and controllable
//! - Broadcast or per-channel pause/resume/volume
//! - Hard clip of the summed master to the valid sample range
//!
//! Channels are shared as `Arc<Mutex<Channel>>` so the producer thread can
//! render while control threads adjust state. Lock order is always mixer
//! before channel.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::channel::{Channel, ChannelError};
use crate::types::StereoBuffer;

/// Lock a channel, recovering from poisoning
///
/// A panicking user callback can poison a channel lock; the channel data
/// itself stays coherent, so recover the guard and continue.
fn lock(channel: &Mutex<Channel>) -> MutexGuard<'_, Channel> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observer invoked with the channel index when a channel finishes playback
///
/// Fires on the rendering thread while that channel's lock is held; the
/// observer must not take the mixer or channel locks.
pub type ChannelEndObserver = Arc<dyn Fn(usize) + Send + Sync>;

/// Combines any number of playback channels into one master output
pub struct Mixer {
    sample_rate: u32,
    buffer_size: usize,
    channels: Vec<Arc<Mutex<Channel>>>,
    on_channel_end: Option<ChannelEndObserver>,
}

impl Mixer {
    /// Create an empty mixer producing buffers at the given rate
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        Self {
            sample_rate,
            buffer_size,
            channels: Vec::new(),
            on_channel_end: None,
        }
    }

    /// Install the end-of-playback observer and rewire existing channels
    pub fn set_on_channel_end(&mut self, observer: impl Fn(usize) + Send + Sync + 'static) {
        self.on_channel_end = Some(Arc::new(observer));
        self.rewire_end_handlers();
    }

    /// Append a new channel, returning its index
    pub fn add_channel(&mut self) -> usize {
        let index = self.channels.len();
        let mut channel = Channel::new(self.sample_rate, self.buffer_size);
        self.wire_end_handler(index, &mut channel);
        self.channels.push(Arc::new(Mutex::new(channel)));
        index
    }

    /// Remove a channel; later channels shift down one index
    pub fn remove_channel(&mut self, index: usize) -> bool {
        if index >= self.channels.len() {
            return false;
        }
        let removed = self.channels.remove(index);
        lock(&removed).close();
        self.rewire_end_handlers();
        true
    }

    /// Close every channel and drop them all
    pub fn clear_channels(&mut self) {
        for channel in &self.channels {
            lock(channel).close();
        }
        self.channels.clear();
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Get a shared handle to a channel
    pub fn channel(&self, index: usize) -> Option<Arc<Mutex<Channel>>> {
        self.channels.get(index).cloned()
    }

    fn wire_end_handler(&self, index: usize, channel: &mut Channel) {
        let observer = self.on_channel_end.clone();
        channel.set_on_end(move |_| {
            if let Some(notify) = &observer {
                notify(index);
            }
        });
    }

    /// Reinstall end handlers so captured indices match current positions
    fn rewire_end_handlers(&mut self) {
        for (index, channel) in self.channels.iter().enumerate() {
            let observer = self.on_channel_end.clone();
            lock(channel).set_on_end(move |_| {
                if let Some(notify) = &observer {
                    notify(index);
                }
            });
        }
    }

    // --- Source management ---

    /// Load a file into a channel's current slot
    pub fn load_file_to_channel(&self, index: usize, path: &Path) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(index)
            .ok_or(ChannelError::NoSuchChannel(index))?;
        lock(channel).load(path)
    }

    /// Queue a file on a channel for gapless continuation
    pub fn queue_to_channel(&self, index: usize, path: &Path) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(index)
            .ok_or(ChannelError::NoSuchChannel(index))?;
        lock(channel).queue(path)
    }

    // --- Playback controls ---

    /// Start playback on one channel
    pub fn play_channel(&self, index: usize) -> bool {
        let Some(channel) = self.channels.get(index) else {
            return false;
        };
        let mut channel = lock(channel);
        channel.play();
        channel.is_playing()
    }

    /// Pause one channel, or all channels when `index` is `None`
    pub fn pause(&self, index: Option<usize>) {
        self.for_channels(index, |channel| channel.pause());
    }

    /// Resume one channel, or all channels when `index` is `None`
    pub fn resume(&self, index: Option<usize>) {
        self.for_channels(index, |channel| channel.resume());
    }

    /// Stop every channel and release their sources
    pub fn stop(&self) {
        self.for_channels(None, |channel| channel.stop());
    }

    /// Set volume percent on one channel, or all when `index` is `None`
    pub fn set_volume(&self, percent: f32, index: Option<usize>) {
        self.for_channels(index, |channel| channel.set_volume(percent));
    }

    fn for_channels(&self, index: Option<usize>, mut apply: impl FnMut(&mut Channel)) {
        match index {
            Some(index) => {
                if let Some(channel) = self.channels.get(index) {
                    apply(&mut lock(channel));
                }
            }
            None => {
                for channel in &self.channels {
                    apply(&mut lock(channel));
                }
            }
        }
    }

    // --- Queries ---

    /// Check one channel, or any channel when `index` is `None`
    pub fn is_playing(&self, index: Option<usize>) -> bool {
        match index {
            Some(index) => self
                .channels
                .get(index)
                .map(|c| lock(c).is_playing())
                .unwrap_or(false),
            None => self.channels.iter().any(|c| lock(c).is_playing()),
        }
    }

    /// Indices of channels currently playing
    pub fn get_active_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| lock(c).is_playing())
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of channels with a loaded source
    pub fn get_loaded_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| lock(c).has_source())
            .map(|(i, _)| i)
            .collect()
    }

    /// Playhead position of a channel in seconds; 0.0 when out of range
    pub fn get_pos(&self, index: usize) -> f64 {
        self.channels
            .get(index)
            .map(|c| lock(c).get_position())
            .unwrap_or(0.0)
    }

    /// Source length of a channel in seconds; 0.0 when out of range
    pub fn get_file_length(&self, index: usize) -> f64 {
        self.channels
            .get(index)
            .map(|c| lock(c).get_file_length())
            .unwrap_or(0.0)
    }

    /// Drain effect fault names from every channel, tagged with the index
    pub fn take_faulted_effects(&self) -> Vec<(usize, String)> {
        let mut faults = Vec::new();
        for (index, channel) in self.channels.iter().enumerate() {
            for name in lock(channel).take_faulted_effects() {
                faults.push((index, name));
            }
        }
        faults
    }

    // --- Rendering ---

    /// Sum all playing channels into one master buffer, clipped to range
    pub fn get_next_buffer(&self, frame_count: usize) -> StereoBuffer {
        let mut master = StereoBuffer::silence(frame_count);
        for channel in &self.channels {
            let mut channel = lock(channel);
            if !channel.is_playing() {
                continue;
            }
            let buffer = channel.get_next_buffer(frame_count);
            master.add_buffer(&buffer);
        }
        master.clamp();
        master
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_constant_wav(
        dir: &tempfile::TempDir,
        name: &str,
        frames: usize,
        value: f32,
    ) -> PathBuf {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let path = dir.path().join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(value).unwrap();
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_mixer_creation() {
        let mut mixer = Mixer::new(44100, 512);
        assert_eq!(mixer.channel_count(), 0);
        assert_eq!(mixer.add_channel(), 0);
        assert_eq!(mixer.add_channel(), 1);
        assert!(mixer.channel(1).is_some());
        assert!(mixer.channel(2).is_none());
    }

    #[test]
    fn test_summed_output_clips_to_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "loud.wav", 44100, 0.8);

        let mut mixer = Mixer::new(44100, 512);
        mixer.add_channel();
        mixer.add_channel();
        mixer.load_file_to_channel(0, &path).unwrap();
        mixer.load_file_to_channel(1, &path).unwrap();
        mixer.set_volume(100.0, None);
        mixer.play_channel(0);
        mixer.play_channel(1);

        // 0.8 + 0.8 sums past full scale and clips at 1.0
        let buffer = mixer.get_next_buffer(512);
        assert_eq!(buffer[0].left, 1.0);
        assert_eq!(buffer[0].right, 1.0);
    }

    #[test]
    fn test_muted_channel_contributes_silence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "tone.wav", 44100, 0.8);

        let mut mixer = Mixer::new(44100, 512);
        mixer.add_channel();
        mixer.add_channel();
        mixer.load_file_to_channel(0, &path).unwrap();
        mixer.load_file_to_channel(1, &path).unwrap();
        mixer.set_volume(100.0, Some(0));
        mixer.set_volume(0.0, Some(1));
        mixer.play_channel(0);
        mixer.play_channel(1);

        let buffer = mixer.get_next_buffer(512);
        assert_eq!(buffer[0].left, 0.8);
    }

    #[test]
    fn test_pause_targets_channel_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "pair.wav", 44100, 0.5);

        let mut mixer = Mixer::new(44100, 512);
        mixer.add_channel();
        mixer.add_channel();
        mixer.load_file_to_channel(0, &path).unwrap();
        mixer.load_file_to_channel(1, &path).unwrap();
        mixer.play_channel(0);
        mixer.play_channel(1);

        // Index zero must target the first channel, not broadcast
        mixer.pause(Some(0));
        let first = mixer.channel(0).unwrap();
        let second = mixer.channel(1).unwrap();
        assert!(first.lock().unwrap().is_paused());
        assert!(!second.lock().unwrap().is_paused());

        mixer.resume(None);
        assert!(!first.lock().unwrap().is_paused());
    }

    #[test]
    fn test_end_observer_receives_channel_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "short.wav", 600, 0.5);

        let mut mixer = Mixer::new(44100, 512);
        mixer.add_channel();
        mixer.add_channel();
        let ended = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ended);
        mixer.set_on_channel_end(move |index| {
            seen.lock().unwrap().push(index);
        });

        mixer.load_file_to_channel(1, &path).unwrap();
        mixer.play_channel(1);
        mixer.get_next_buffer(512);
        mixer.get_next_buffer(512);

        assert_eq!(*ended.lock().unwrap(), vec![1]);
        assert!(!mixer.is_playing(None));
    }

    #[test]
    fn test_active_and_loaded_channel_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "list.wav", 44100, 0.5);

        let mut mixer = Mixer::new(44100, 512);
        mixer.add_channel();
        mixer.add_channel();
        mixer.add_channel();
        mixer.load_file_to_channel(0, &path).unwrap();
        mixer.load_file_to_channel(2, &path).unwrap();
        mixer.play_channel(2);

        assert_eq!(mixer.get_loaded_channels(), vec![0, 2]);
        assert_eq!(mixer.get_active_channels(), vec![2]);
        assert!(mixer.is_playing(Some(2)));
        assert!(!mixer.is_playing(Some(0)));
    }

    #[test]
    fn test_position_queries_out_of_range() {
        let mixer = Mixer::new(44100, 512);
        assert_eq!(mixer.get_pos(99), 0.0);
        assert_eq!(mixer.get_file_length(99), 0.0);
        assert!(!mixer.is_playing(Some(99)));
    }

    #[test]
    fn test_remove_channel_rewires_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_constant_wav(&dir, "rewire.wav", 600, 0.5);

        let mut mixer = Mixer::new(44100, 512);
        mixer.add_channel();
        mixer.add_channel();
        let ended = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ended);
        mixer.set_on_channel_end(move |index| {
            seen.lock().unwrap().push(index);
        });

        assert!(mixer.remove_channel(0));
        assert_eq!(mixer.channel_count(), 1);

        // The surviving channel now reports as index 0
        mixer.load_file_to_channel(0, &path).unwrap();
        mixer.play_channel(0);
        mixer.get_next_buffer(512);
        mixer.get_next_buffer(512);
        assert_eq!(*ended.lock().unwrap(), vec![0]);
    }
}
