//! Symphonia-backed audio source
//!
//! Streams packets out of the container on demand, decoding into an
//! interleaved f32 queue that `read` drains. Seeks go through the format
//! reader with a decoder reset and a sample-accurate discard of the frames
//! between the container's coarse seek point and the requested position.

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioSource, DecodeError, DecodeResult};
use crate::types::Sample;

/// Streaming decoder over any container/codec Symphonia recognizes
pub struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    frames_total: u64,
    /// Decoded-but-unconsumed interleaved samples
    pending: VecDeque<Sample>,
    sample_buf: Option<SampleBuffer<Sample>>,
    /// Read position in frames (consumed, not decoded)
    position: u64,
    exhausted: bool,
}

impl SymphoniaSource {
    /// Open and probe a file, selecting the first decodable audio track
    pub fn open(path: &Path) -> DecodeResult<Self> {
        let file = File::open(path).map_err(|e| DecodeError::Open {
            path: path.display().to_string(),
            source: e,
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;

        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(DecodeError::UnknownSampleRate)?;

        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        let frames_total = track.codec_params.n_frames.unwrap_or(0);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::DecoderInit(e.to_string()))?;

        log::debug!(
            "Opened {}: {} Hz, {} ch, {} frames",
            path.display(),
            sample_rate,
            channels,
            frames_total
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            frames_total,
            pending: VecDeque::new(),
            sample_buf: None,
            position: 0,
            exhausted: false,
        })
    }

    /// Decode packets until at least `samples` interleaved samples are
    /// pending or the stream ends
    fn fill_pending(&mut self, samples: usize) {
        while self.pending.len() < samples && !self.exhausted {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.exhausted = true;
                    break;
                }
                Err(e) => {
                    log::warn!("Error reading packet: {}", e);
                    self.exhausted = true;
                    break;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::warn!("Error decoding packet: {}", e);
                    continue;
                }
            };

            if self.sample_buf.is_none() {
                let spec = *decoded.spec();
                let duration = decoded.capacity() as u64;
                self.sample_buf = Some(SampleBuffer::new(duration, spec));
            }

            if let Some(ref mut buf) = self.sample_buf {
                buf.copy_interleaved_ref(decoded);
                self.pending.extend(buf.samples().iter().copied());
            }
        }
    }

    /// Drop `frames` frames from the front of the stream (post-seek resync)
    fn discard_frames(&mut self, frames: u64) {
        let mut remaining = frames as usize * self.channels as usize;
        while remaining > 0 {
            if self.pending.is_empty() {
                self.fill_pending(remaining);
                if self.pending.is_empty() {
                    break;
                }
            }
            let take = remaining.min(self.pending.len());
            self.pending.drain(..take);
            remaining -= take;
        }
    }
}

impl AudioSource for SymphoniaSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn frames_total(&self) -> u64 {
        self.frames_total
    }

    fn position_frames(&self) -> u64 {
        self.position
    }

    fn read(&mut self, frames: usize, out: &mut Vec<Sample>) -> usize {
        out.clear();
        let wanted = frames * self.channels as usize;
        self.fill_pending(wanted);

        let take = wanted.min(self.pending.len());
        // Whole frames only
        let take = take - (take % self.channels as usize);
        out.extend(self.pending.drain(..take));

        let frames_read = take / self.channels as usize;
        self.position += frames_read as u64;
        frames_read
    }

    fn seek(&mut self, frame: u64) -> DecodeResult<()> {
        if self.frames_total > 0 && frame > self.frames_total {
            return Err(DecodeError::Seek(format!(
                "position {} past end of stream ({} frames)",
                frame, self.frames_total
            )));
        }

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| DecodeError::Seek(e.to_string()))?;

        self.decoder.reset();
        self.pending.clear();
        self.exhausted = false;
        self.position = seeked.actual_ts;

        // Containers may land on a packet boundary before the target
        if seeked.actual_ts < frame {
            let discard = frame - seeked.actual_ts;
            self.discard_frames(discard);
            self.position = frame;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_test_wav(dir: &tempfile::TempDir, name: &str, frames: u32, channels: u16) -> PathBuf {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = dir.path().join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            let value = ((i % 100) as f32 / 100.0 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_open_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(&dir, "meta.wav", 1000, 2);

        let source = SymphoniaSource::open(&path).unwrap();
        assert_eq!(source.sample_rate(), 44100);
        assert_eq!(source.channels(), 2);
        assert_eq!(source.frames_total(), 1000);
        assert_eq!(source.position_frames(), 0);
    }

    #[test]
    fn test_read_to_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(&dir, "short.wav", 600, 1);

        let mut source = SymphoniaSource::open(&path).unwrap();
        let mut out = Vec::new();

        let first = source.read(512, &mut out);
        assert_eq!(first, 512);
        assert_eq!(out.len(), 512);

        let second = source.read(512, &mut out);
        assert_eq!(second, 88);
        assert_eq!(source.position_frames(), 600);

        let third = source.read(512, &mut out);
        assert_eq!(third, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_seek_resyncs_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(&dir, "seek.wav", 2000, 2);

        let mut source = SymphoniaSource::open(&path).unwrap();
        let mut out = Vec::new();
        source.read(100, &mut out);

        source.seek(1500).unwrap();
        assert_eq!(source.position_frames(), 1500);

        let read = source.read(1000, &mut out);
        assert_eq!(read, 500);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let err = SymphoniaSource::open(Path::new("/nonexistent/missing.wav"));
        assert!(matches!(err, Err(DecodeError::Open { .. })));
    }
}
