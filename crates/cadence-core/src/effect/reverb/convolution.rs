//! Convolution reverb: direct-form FIR against a recorded impulse response
//!
//! The impulse response is loaded once at construction. Processing streams
//! each channel through a causal FIR whose history ring persists across
//! buffers, so block boundaries never leak into the tail. Direct-form
//! convolution is O(block * taps); this effect is meant for offline
//! rendering and short impulses, not the realtime path.

use std::path::Path;

use crate::decode::{self, DecodeError, DecodeResult};
use crate::effect::{Effect, EffectBase, EffectInfo, ParamValue};
use crate::types::StereoBuffer;

/// Longest impulse response kept, in frames; longer files are truncated
pub const MAX_IR_FRAMES: usize = 65536;

/// FIR reverb driven by a stereo impulse response
pub struct ConvolutionReverb {
    base: EffectBase,
    ir: [Vec<f32>; 2],
    history: [Vec<f32>; 2],
    pos: usize,
}

impl ConvolutionReverb {
    /// Build from raw per-channel impulse responses
    ///
    /// Channels are padded to equal length; anything past
    /// [`MAX_IR_FRAMES`] is dropped.
    pub fn from_impulse(mut left: Vec<f32>, mut right: Vec<f32>) -> Self {
        let frames = left.len().max(right.len());
        if frames > MAX_IR_FRAMES {
            log::warn!(
                "Impulse response truncated from {} to {} frames",
                frames,
                MAX_IR_FRAMES
            );
        }
        let frames = frames.min(MAX_IR_FRAMES).max(1);
        left.resize(frames, 0.0);
        right.resize(frames, 0.0);

        Self {
            base: EffectBase::new(EffectInfo::new("Convolution Reverb", "Reverb")),
            history: [vec![0.0; frames], vec![0.0; frames]],
            ir: [left, right],
            pos: 0,
        }
    }

    /// Load the impulse response from an audio file
    ///
    /// Mono files are applied to both channels; files with more than two
    /// channels contribute their first two.
    pub fn from_file(path: &Path) -> DecodeResult<Self> {
        let mut source = decode::open_source(path)?;
        let channels = source.channels() as usize;

        let mut interleaved = Vec::new();
        let mut left = Vec::new();
        let mut right = Vec::new();
        loop {
            let produced = source.read(4096, &mut interleaved);
            if produced == 0 {
                break;
            }
            for frame in interleaved.chunks_exact(channels) {
                left.push(frame[0]);
                right.push(if channels > 1 { frame[1] } else { frame[0] });
            }
            if left.len() >= MAX_IR_FRAMES {
                break;
            }
        }

        if left.is_empty() {
            return Err(DecodeError::UnsupportedFormat(format!(
                "empty impulse response: {}",
                path.display()
            )));
        }

        Ok(Self::from_impulse(left, right))
    }

    /// Length of the loaded impulse response in frames
    pub fn ir_frames(&self) -> usize {
        self.ir[0].len()
    }

    #[inline]
    fn convolve(ir: &[f32], history: &[f32], pos: usize) -> f32 {
        let len = history.len();
        let mut acc = 0.0;
        let mut idx = pos;
        for &coeff in ir {
            acc += coeff * history[idx];
            idx = if idx == 0 { len - 1 } else { idx - 1 };
        }
        acc
    }
}

impl Effect for ConvolutionReverb {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.base.is_bypassed() {
            return;
        }

        let len = self.history[0].len();
        for sample in buffer.iter_mut() {
            self.history[0][self.pos] = sample.left;
            self.history[1][self.pos] = sample.right;
            sample.left = Self::convolve(&self.ir[0], &self.history[0], self.pos);
            sample.right = Self::convolve(&self.ir[1], &self.history[1], self.pos);
            self.pos = (self.pos + 1) % len;
        }
    }

    fn info(&self) -> &EffectInfo {
        self.base.info()
    }

    fn get_params(&self) -> &[ParamValue] {
        self.base.get_params()
    }

    fn set_param(&mut self, index: usize, value: f32) {
        self.base.set_param(index, value);
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.base.set_bypass(bypass);
    }

    fn is_bypassed(&self) -> bool {
        self.base.is_bypassed()
    }

    fn reset(&mut self) {
        for ring in &mut self.history {
            ring.fill(0.0);
        }
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_identity_kernel_is_transparent() {
        let mut effect = ConvolutionReverb::from_impulse(vec![1.0], vec![1.0]);
        let mut buffer = StereoBuffer::silence(8);
        buffer.as_mut_slice()[0] = StereoSample::new(0.5, -0.25);
        buffer.as_mut_slice()[3] = StereoSample::new(-1.0, 1.0);

        effect.process(&mut buffer);

        assert_eq!(buffer[0].left, 0.5);
        assert_eq!(buffer[0].right, -0.25);
        assert_eq!(buffer[3].left, -1.0);
        assert_eq!(buffer[3].right, 1.0);
    }

    #[test]
    fn test_shift_kernel_delays_one_sample() {
        let mut effect = ConvolutionReverb::from_impulse(vec![0.0, 1.0], vec![0.0, 1.0]);
        let mut buffer = StereoBuffer::silence(4);
        buffer.as_mut_slice()[0] = StereoSample::mono(1.0);

        effect.process(&mut buffer);

        assert_eq!(buffer[0].left, 0.0);
        assert_eq!(buffer[1].left, 1.0);
        assert_eq!(buffer[2].left, 0.0);
    }

    #[test]
    fn test_tail_spans_buffers() {
        let mut effect = ConvolutionReverb::from_impulse(vec![0.0, 0.0, 1.0], vec![0.0, 0.0, 1.0]);

        // Impulse lands on the last frame, so the echo falls in the next buffer
        let mut first = StereoBuffer::silence(2);
        first.as_mut_slice()[1] = StereoSample::mono(1.0);
        effect.process(&mut first);
        assert_eq!(first[1].left, 0.0);

        let mut second = StereoBuffer::silence(2);
        effect.process(&mut second);
        assert_eq!(second[1].left, 1.0);
    }

    #[test]
    fn test_channels_padded_to_equal_length() {
        let effect = ConvolutionReverb::from_impulse(vec![1.0, 0.5, 0.25], vec![1.0]);
        assert_eq!(effect.ir_frames(), 3);
    }

    #[test]
    fn test_long_impulse_truncated() {
        let effect =
            ConvolutionReverb::from_impulse(vec![0.0; MAX_IR_FRAMES + 128], vec![0.0; 16]);
        assert_eq!(effect.ir_frames(), MAX_IR_FRAMES);
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut effect = ConvolutionReverb::from_impulse(vec![0.0, 1.0], vec![0.0, 1.0]);
        let mut buffer = StereoBuffer::silence(1);
        buffer.as_mut_slice()[0] = StereoSample::mono(1.0);
        effect.process(&mut buffer);

        effect.reset();

        let mut next = StereoBuffer::silence(2);
        effect.process(&mut next);
        assert_eq!(next[0].left, 0.0);
        assert_eq!(next[1].left, 0.0);
    }

    #[test]
    fn test_from_file_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ir.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // L = [1, 0], R = [0, 1]
        for frame in [[1.0f32, 0.0], [0.0, 1.0]] {
            writer.write_sample(frame[0]).unwrap();
            writer.write_sample(frame[1]).unwrap();
        }
        writer.finalize().unwrap();

        let mut effect = ConvolutionReverb::from_file(&path).unwrap();
        assert_eq!(effect.ir_frames(), 2);

        let mut buffer = StereoBuffer::silence(2);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        effect.process(&mut buffer);

        assert_eq!(buffer[0].left, 1.0);
        assert_eq!(buffer[0].right, 0.0);
        assert_eq!(buffer[1].left, 0.0);
        assert_eq!(buffer[1].right, 1.0);
    }

    #[test]
    fn test_from_file_mono_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono_ir.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        let mut effect = ConvolutionReverb::from_file(&path).unwrap();
        let mut buffer = StereoBuffer::silence(1);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 0.5);
        effect.process(&mut buffer);

        assert_eq!(buffer[0].left, 0.5);
        assert_eq!(buffer[0].right, 0.25);
    }
}
