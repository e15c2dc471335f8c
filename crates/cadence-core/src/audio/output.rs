//! CPAL output stream fed from a lock-free buffer queue
//!
//! The device callback never renders audio and never blocks. A producer
//! thread renders buffers ahead of time and pushes them onto a lock-free
//! SPSC ring; the callback pops them, copies samples to the device, and
//! hands the spent allocations back through a second ring for reuse. When
//! the filled ring runs dry the callback plays silence, so a stalled
//! producer degrades to dropouts rather than blocking the audio thread.
//!
//! ```text
//! ┌──────────────────┐   filled buffers    ┌─────────────────────┐
//! │ Producer Thread  │────────────────────►│  CPAL Audio Thread  │
//! │ (renders mixer)  │◄────────────────────│  (copy + meter)     │
//! └──────────────────┘   spent buffers     └─────────────────────┘
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::error::{AudioError, AudioResult};
use crate::types::{StereoBuffer, StereoSample, MAX_BUFFER_SIZE};

/// Lock-free output meter updated once per device callback
///
/// Levels are the per-channel absolute maxima of the last device block,
/// stored as f32 bit patterns so readers never take a lock.
pub struct OutputMeter {
    level_left: AtomicU32,
    level_right: AtomicU32,
    peak: AtomicU32,
    frames: AtomicU64,
}

impl OutputMeter {
    pub fn new() -> Self {
        Self {
            level_left: AtomicU32::new(0.0f32.to_bits()),
            level_right: AtomicU32::new(0.0f32.to_bits()),
            peak: AtomicU32::new(0.0f32.to_bits()),
            frames: AtomicU64::new(0),
        }
    }

    /// Per-channel output levels of the last device block
    #[inline]
    pub fn levels(&self) -> (f32, f32) {
        (
            f32::from_bits(self.level_left.load(Ordering::Relaxed)),
            f32::from_bits(self.level_right.load(Ordering::Relaxed)),
        )
    }

    /// Combined peak of the last device block
    #[inline]
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    /// Total frames the device has pulled, including underrun silence
    #[inline]
    pub fn frames_played(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn store(&self, left: f32, right: f32, frames: u64) {
        self.level_left.store(left.to_bits(), Ordering::Relaxed);
        self.level_right.store(right.to_bits(), Ordering::Relaxed);
        self.peak.store(left.max(right).to_bits(), Ordering::Relaxed);
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }
}

impl Default for OutputMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// A rendered buffer being copied out sample by sample
struct PendingBuffer {
    buffer: StereoBuffer,
    offset: usize,
}

/// Callback-side state: consumes filled buffers, returns spent ones
struct OutputCallback {
    filled: rtrb::Consumer<StereoBuffer>,
    recycle: rtrb::Producer<StereoBuffer>,
    pending: Option<PendingBuffer>,
    meter: Arc<OutputMeter>,
}

impl OutputCallback {
    fn new(
        filled: rtrb::Consumer<StereoBuffer>,
        recycle: rtrb::Producer<StereoBuffer>,
        meter: Arc<OutputMeter>,
    ) -> Self {
        Self {
            filled,
            recycle,
            pending: None,
            meter,
        }
    }

    /// Fill one interleaved device block
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        let mut underrun = false;

        if channels == 2 {
            // Stereo matches the buffer layout, so whole slices copy across
            self.fill_stereo(data, &mut underrun);
        } else {
            self.fill_frames(data, channels, &mut underrun);
        }

        let mut level_left = 0.0f32;
        let mut level_right = 0.0f32;
        for frame in data.chunks_exact(channels) {
            level_left = level_left.max(frame[0].abs());
            let right = if channels > 1 { frame[1] } else { frame[0] };
            level_right = level_right.max(right.abs());
        }
        self.meter
            .store(level_left, level_right, (data.len() / channels) as u64);

        if underrun {
            log::warn!("Queue empty, playing silence");
        }
    }

    fn fill_stereo(&mut self, data: &mut [f32], underrun: &mut bool) {
        let mut filled = 0;
        while filled < data.len() {
            match self.pending.take() {
                Some(mut pending) => {
                    if pending.offset >= pending.buffer.len() {
                        // Spent: hand the allocation back to the producer
                        let _ = self.recycle.push(pending.buffer);
                        continue;
                    }
                    let src = &pending.buffer.as_interleaved()[pending.offset * 2..];
                    let n = src.len().min(data.len() - filled);
                    data[filled..filled + n].copy_from_slice(&src[..n]);
                    filled += n;
                    pending.offset += n / 2;
                    self.pending = Some(pending);
                }
                None => match self.filled.pop() {
                    Ok(buffer) => self.pending = Some(PendingBuffer { buffer, offset: 0 }),
                    Err(_) => {
                        *underrun = true;
                        data[filled..].fill(0.0);
                        break;
                    }
                },
            }
        }
    }

    fn fill_frames(&mut self, data: &mut [f32], channels: usize, underrun: &mut bool) {
        for frame in data.chunks_mut(channels) {
            let sample = self.next_sample(underrun);
            frame[0] = sample.left;
            if channels > 1 {
                frame[1] = sample.right;
            }
            for ch in frame.iter_mut().skip(2) {
                *ch = 0.0;
            }
        }
    }

    fn next_sample(&mut self, underrun: &mut bool) -> StereoSample {
        loop {
            match self.pending.take() {
                Some(mut pending) => {
                    if pending.offset < pending.buffer.len() {
                        let sample = pending.buffer[pending.offset];
                        pending.offset += 1;
                        self.pending = Some(pending);
                        return sample;
                    }
                    // Spent: hand the allocation back to the producer
                    let _ = self.recycle.push(pending.buffer);
                }
                None => match self.filled.pop() {
                    Ok(buffer) => self.pending = Some(PendingBuffer { buffer, offset: 0 }),
                    Err(_) => {
                        *underrun = true;
                        return StereoSample::silence();
                    }
                },
            }
        }
    }
}

/// Running output stream handle
///
/// Keeps the device stream alive. Drop this to stop audio.
pub struct OutputStream {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl OutputStream {
    /// Get the sample rate of the stream
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the configured buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Get the output latency in milliseconds (one buffer)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Names of all available output devices on the default host
pub fn output_device_names() -> Vec<String> {
    let host = cpal::default_host();
    match host.output_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            log::warn!("Could not enumerate output devices: {}", e);
            Vec::new()
        }
    }
}

fn find_output_device(name: Option<&str>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::NoDefaultDevice("no default output device".to_string())),
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| AudioError::NoDefaultDevice(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
        }
    }
}

/// Pick the best supported config for the device at the requested rate
///
/// Prefers f32 format and stereo. The requested sample rate is required:
/// rendered buffers are already at that rate, so a device that cannot run
/// at it is an error rather than a silent pitch shift.
fn pick_stream_config(
    device: &cpal::Device,
    requested_rate: u32,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .filter(|c| {
            requested_rate >= c.min_sample_rate().0 && requested_rate <= c.max_sample_rate().0
        })
        .next()
        .or_else(|| {
            supported_configs
                .iter()
                .filter(|c| c.sample_format() == SampleFormat::F32)
                .find(|c| {
                    requested_rate >= c.min_sample_rate().0
                        && requested_rate <= c.max_sample_rate().0
                })
        })
        .ok_or_else(|| {
            AudioError::ConfigError(format!(
                "Device does not support {}Hz f32 output",
                requested_rate
            ))
        })?;

    Ok(best_config
        .clone()
        .with_sample_rate(cpal::SampleRate(requested_rate)))
}

/// Open the output device and start the stream
///
/// The callback drains `filled` and returns spent buffers via `recycle`.
/// `device_name` of `None` selects the default output device.
pub fn open_output_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    buffer_size: u32,
    filled: rtrb::Consumer<StereoBuffer>,
    recycle: rtrb::Producer<StereoBuffer>,
    meter: Arc<OutputMeter>,
) -> AudioResult<OutputStream> {
    let device = find_output_device(device_name)?;
    let device_label = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_label);

    let supported_config = pick_stream_config(&device, sample_rate)?;
    let buffer_size = buffer_size.clamp(64, MAX_BUFFER_SIZE as u32);

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    let channels = stream_config.channels as usize;
    let mut callback = OutputCallback::new(filled, recycle, meter);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                callback.fill(data, channels);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(OutputStream {
        _stream: stream,
        sample_rate,
        buffer_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_buffer(len: usize, value: f32) -> StereoBuffer {
        let mut buffer = StereoBuffer::silence(len);
        for sample in buffer.iter_mut() {
            *sample = StereoSample::mono(value);
        }
        buffer
    }

    #[test]
    fn test_callback_copies_buffers_in_order() {
        let (mut filled_tx, filled_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let (recycle_tx, _recycle_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let mut callback = OutputCallback::new(filled_rx, recycle_tx, Arc::new(OutputMeter::new()));

        filled_tx.push(constant_buffer(4, 0.25)).unwrap();
        filled_tx.push(constant_buffer(4, 0.5)).unwrap();

        let mut data = [0.0f32; 16];
        callback.fill(&mut data, 2);

        assert!(data[..8].iter().all(|&s| s == 0.25));
        assert!(data[8..].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_callback_spans_device_blocks() {
        let (mut filled_tx, filled_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let (recycle_tx, _recycle_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let mut callback = OutputCallback::new(filled_rx, recycle_tx, Arc::new(OutputMeter::new()));

        // One 8-frame buffer feeds two 4-frame device blocks
        filled_tx.push(constant_buffer(8, 0.75)).unwrap();

        let mut first = [0.0f32; 8];
        callback.fill(&mut first, 2);
        let mut second = [0.0f32; 8];
        callback.fill(&mut second, 2);

        assert!(first.iter().all(|&s| s == 0.75));
        assert!(second.iter().all(|&s| s == 0.75));
    }

    #[test]
    fn test_callback_plays_silence_when_ring_empty() {
        let (_filled_tx, filled_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let (recycle_tx, _recycle_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let meter = Arc::new(OutputMeter::new());
        let mut callback = OutputCallback::new(filled_rx, recycle_tx, Arc::clone(&meter));

        let mut data = [1.0f32; 8];
        callback.fill(&mut data, 2);

        assert!(data.iter().all(|&s| s == 0.0));
        assert_eq!(meter.peak(), 0.0);
    }

    #[test]
    fn test_callback_recycles_spent_buffers() {
        let (mut filled_tx, filled_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let (recycle_tx, mut recycle_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let mut callback = OutputCallback::new(filled_rx, recycle_tx, Arc::new(OutputMeter::new()));

        filled_tx.push(constant_buffer(2, 0.1)).unwrap();
        filled_tx.push(constant_buffer(2, 0.2)).unwrap();

        let mut data = [0.0f32; 8];
        callback.fill(&mut data, 2);

        // First buffer fully consumed and returned; second still pending
        let spent = recycle_rx.pop().unwrap();
        assert_eq!(spent.len(), 2);
        assert!(recycle_rx.pop().is_err());
    }

    #[test]
    fn test_callback_silences_extra_device_channels() {
        let (mut filled_tx, filled_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let (recycle_tx, _recycle_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let mut callback = OutputCallback::new(filled_rx, recycle_tx, Arc::new(OutputMeter::new()));

        filled_tx.push(constant_buffer(2, 0.5)).unwrap();

        // 4-channel device: frames carry stereo plus two silent channels
        let mut data = [9.0f32; 8];
        callback.fill(&mut data, 4);

        assert_eq!(&data[..4], &[0.5, 0.5, 0.0, 0.0]);
        assert_eq!(&data[4..], &[0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_meter_tracks_block_levels() {
        let (mut filled_tx, filled_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let (recycle_tx, _recycle_rx) = rtrb::RingBuffer::<StereoBuffer>::new(4);
        let meter = Arc::new(OutputMeter::new());
        let mut callback = OutputCallback::new(filled_rx, recycle_tx, Arc::clone(&meter));

        let mut buffer = StereoBuffer::silence(4);
        buffer[1] = StereoSample::new(-0.6, 0.3);
        filled_tx.push(buffer).unwrap();

        let mut data = [0.0f32; 8];
        callback.fill(&mut data, 2);

        let (left, right) = meter.levels();
        assert_eq!(left, 0.6);
        assert_eq!(right, 0.3);
        assert_eq!(meter.peak(), 0.6);
        assert_eq!(meter.frames_played(), 4);
    }
}
