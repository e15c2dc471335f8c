//! Sample-rate conversion
//!
//! Two pieces: [`ResampleRatio`], the reduced rational approximation of
//! `target_rate / native_rate` with a bounded denominator (keeps polyphase
//! filter cost bounded for arbitrary rate pairs), and [`StreamResampler`],
//! a streaming sinc resampler running at exactly that rational ratio.
//!
//! The resampler produces fixed-size output chunks (the engine block size)
//! and reports how many native frames it needs per call; at end-of-stream a
//! partial call flushes the filter tail, and total output is trimmed to
//! `ceil(input_frames * ratio)` so block seams and gapless promotions lose
//! no frames and gain no padding.

use rubato::audioadapter::{Adapter, AdapterMut};
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::types::{StereoBuffer, StereoSample};

/// Largest denominator allowed in the reduced ratio
pub const MAX_DENOMINATOR: u64 = 1000;

/// Reduced rational approximation of an output/input rate ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleRatio {
    /// Upsampling factor (numerator)
    pub up: u64,
    /// Downsampling factor (denominator)
    pub down: u64,
}

impl ResampleRatio {
    /// Approximate `target_rate / native_rate` with denominator bounded by
    /// [`MAX_DENOMINATOR`]
    ///
    /// Uses the continued-fraction construction: of the two candidate
    /// fractions below the bound, the one closest to the true ratio wins.
    pub fn new(target_rate: u32, native_rate: u32) -> Self {
        let g = gcd(target_rate as u64, native_rate as u64);
        let n = target_rate as u64 / g;
        let d = native_rate as u64 / g;

        if d <= MAX_DENOMINATOR {
            return Self { up: n, down: d };
        }

        // Walk the continued-fraction convergents until the denominator
        // would exceed the bound
        let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
        let (mut num, mut den) = (n, d);
        loop {
            let a = num / den;
            let q2 = q0 + a * q1;
            if q2 > MAX_DENOMINATOR {
                break;
            }
            let new_p1 = p0 + a * p1;
            p0 = p1;
            q0 = q1;
            p1 = new_p1;
            q1 = q2;
            let rem = num - a * den;
            num = den;
            den = rem;
        }

        let k = (MAX_DENOMINATOR - q0) / q1;
        let (pb, qb) = (p0 + k * p1, q0 + k * q1);

        // |p1/q1 - n/d| <= |pb/qb - n/d|  <=>  |p1*d - n*q1| * qb <= |pb*d - n*qb| * q1
        let err1 = (p1 as i128 * d as i128 - n as i128 * q1 as i128).unsigned_abs() * qb as u128;
        let err2 = (pb as i128 * d as i128 - n as i128 * qb as i128).unsigned_abs() * q1 as u128;
        if err1 <= err2 {
            Self { up: p1, down: q1 }
        } else {
            Self { up: pb, down: qb }
        }
    }

    /// A 1:1 ratio (no resampling)
    pub fn unity() -> Self {
        Self { up: 1, down: 1 }
    }

    /// True when no resampling is needed
    #[inline]
    pub fn is_unity(&self) -> bool {
        self.up == self.down
    }

    /// The ratio as a float (output rate / input rate)
    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.up as f64 / self.down as f64
    }

    /// Native input frames required to produce `output_frames` (ceiling)
    pub fn input_frames_for(&self, output_frames: usize) -> usize {
        let n = output_frames as u64 * self.down;
        n.div_ceil(self.up) as usize
    }

    /// Output frames produced by `input_frames` native frames (ceiling)
    pub fn output_frames_for(&self, input_frames: usize) -> usize {
        let n = input_frames as u64 * self.up;
        n.div_ceil(self.down) as usize
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Error from resampler construction or processing
#[derive(Debug, thiserror::Error)]
#[error("Resampler error: {0}")]
pub struct ResampleError(String);

/// Adapter exposing a `&[StereoSample]` slice to rubato as 2-channel input
struct SampleSlice<'a> {
    samples: &'a [StereoSample],
    frames: usize,
}

impl<'a> Adapter<'a, f32> for SampleSlice<'a> {
    unsafe fn read_sample_unchecked(&self, channel: usize, frame: usize) -> f32 {
        let sample = unsafe { self.samples.get_unchecked(frame) };
        if channel == 0 {
            sample.left
        } else {
            sample.right
        }
    }

    fn channels(&self) -> usize {
        2
    }

    fn frames(&self) -> usize {
        self.frames
    }
}

/// Adapter exposing a `&mut [StereoSample]` slice to rubato as 2-channel output
struct SampleSliceMut<'a> {
    samples: &'a mut [StereoSample],
    frames: usize,
}

impl<'a> Adapter<'a, f32> for SampleSliceMut<'a> {
    unsafe fn read_sample_unchecked(&self, channel: usize, frame: usize) -> f32 {
        let sample = unsafe { self.samples.get_unchecked(frame) };
        if channel == 0 {
            sample.left
        } else {
            sample.right
        }
    }

    fn channels(&self) -> usize {
        2
    }

    fn frames(&self) -> usize {
        self.frames
    }
}

impl<'a> AdapterMut<'a, f32> for SampleSliceMut<'a> {
    unsafe fn write_sample_unchecked(&mut self, channel: usize, frame: usize, value: &f32) -> bool {
        let sample = unsafe { self.samples.get_unchecked_mut(frame) };
        if channel == 0 {
            sample.left = *value;
        } else {
            sample.right = *value;
        }
        false
    }
}

/// Streaming stereo resampler at a fixed rational ratio
///
/// Fixed-output sinc resampler: every full process call yields one output
/// chunk. Callers feed exactly [`input_frames_next`](Self::input_frames_next)
/// frames per call and finish the stream with [`flush_into`](Self::flush_into).
pub struct StreamResampler {
    resampler: Async<f32>,
    ratio: ResampleRatio,
    scratch: Vec<StereoSample>,
    /// Native frames fed so far
    frames_in: u64,
    /// Output frames emitted so far
    frames_out: u64,
}

impl StreamResampler {
    /// Create a resampler producing `output_chunk`-frame blocks
    pub fn new(ratio: ResampleRatio, output_chunk: usize) -> Result<Self, ResampleError> {
        let iparams = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            oversampling_factor: 128,
            interpolation: SincInterpolationType::Linear,
            window: WindowFunction::BlackmanHarris2,
        };
        let resampler = Async::<f32>::new_sinc(
            ratio.as_f64(),
            1.0,
            &iparams,
            output_chunk,
            2,
            FixedAsync::Output,
        )
        .map_err(|e| ResampleError(e.to_string()))?;

        Ok(Self {
            resampler,
            ratio,
            scratch: Vec::new(),
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// The rational ratio this resampler runs at
    pub fn ratio(&self) -> ResampleRatio {
        self.ratio
    }

    /// Native frames required for the next full process call
    pub fn input_frames_next(&self) -> usize {
        self.resampler.input_frames_next()
    }

    /// Clear filter state for reuse at a new stream position
    pub fn reset(&mut self) {
        self.resampler.reset();
        self.frames_in = 0;
        self.frames_out = 0;
    }

    /// Process one full input chunk, appending produced frames to `out`
    ///
    /// `input` must hold exactly [`input_frames_next`](Self::input_frames_next)
    /// frames. Returns the number of output frames appended.
    pub fn process_into(
        &mut self,
        input: &[StereoSample],
        out: &mut StereoBuffer,
    ) -> Result<usize, ResampleError> {
        let out_frames = self.resampler.output_frames_next();
        self.scratch.resize(out_frames, StereoSample::silence());

        let adapter_in = SampleSlice {
            samples: input,
            frames: input.len(),
        };
        let mut adapter_out = SampleSliceMut {
            samples: &mut self.scratch,
            frames: out_frames,
        };

        let (frames_used, frames_produced) = self
            .resampler
            .process_into_buffer(&adapter_in, &mut adapter_out, None)
            .map_err(|e| ResampleError(e.to_string()))?;

        self.frames_in += frames_used as u64;
        self.frames_out += frames_produced as u64;
        out.extend_from_slice(&self.scratch[..frames_produced]);
        Ok(frames_produced)
    }

    /// Flush the filter tail at end-of-stream, appending to `out`
    ///
    /// `remainder` holds the final short input chunk (possibly empty). The
    /// total stream output is trimmed to `ceil(total_input * ratio)` frames,
    /// the length a whole-stream polyphase resample would produce.
    pub fn flush_into(
        &mut self,
        remainder: &[StereoSample],
        out: &mut StereoBuffer,
    ) -> Result<usize, ResampleError> {
        let target_total = self
            .ratio
            .output_frames_for((self.frames_in + remainder.len() as u64) as usize)
            as u64;
        let mut appended = 0usize;
        let mut pending = remainder;

        while self.frames_out < target_total {
            let out_frames = self.resampler.output_frames_next();
            self.scratch.resize(out_frames, StereoSample::silence());

            let adapter_in = SampleSlice {
                samples: pending,
                frames: pending.len(),
            };
            let mut adapter_out = SampleSliceMut {
                samples: &mut self.scratch,
                frames: out_frames,
            };
            let indexing = Indexing {
                input_offset: 0,
                output_offset: 0,
                partial_len: Some(pending.len()),
                active_channels_mask: None,
            };

            let (frames_used, frames_produced) = self
                .resampler
                .process_into_buffer(&adapter_in, &mut adapter_out, Some(&indexing))
                .map_err(|e| ResampleError(e.to_string()))?;

            self.frames_in += frames_used.min(pending.len()) as u64;
            pending = &pending[frames_used.min(pending.len())..];

            if frames_produced == 0 {
                break;
            }

            let keep = ((target_total - self.frames_out) as usize).min(frames_produced);
            self.frames_out += keep as u64;
            out.extend_from_slice(&self.scratch[..keep]);
            appended += keep;
        }

        Ok(appended)
    }
}
