//! Feedback delay network reverb with modulated lines

use crate::effect::dsp::{OnePole, PreDelay};
use crate::effect::{Effect, EffectBase, EffectInfo, ParamInfo, ParamValue};
use crate::types::StereoBuffer;

/// Base delay times in samples, prime to decorrelate the lines
const DELAY_TIMES: [f32; 4] = [37.0, 87.0, 181.0, 271.0];
/// Per-line LFO rates in Hz
const LFO_RATES: [f32; 4] = [0.7, 1.1, 1.5, 2.0];
/// Input diffusion allpass lengths
const DIFFUSER_LENGTHS: [usize; 2] = [105, 337];
/// Diffuser read tap offset
const DIFFUSER_TAP: usize = 5;

const DECAY_MIN_S: f32 = 0.1;
const DECAY_MAX_S: f32 = 4.0;
const ROOM_MIN: f32 = 0.1;
const ROOM_MAX: f32 = 1.0;

struct FdnLine {
    buf: [Vec<f32>; 2],
    idx: usize,
}

impl FdnLine {
    fn new(len: usize) -> Self {
        Self {
            buf: [vec![0.0; len], vec![0.0; len]],
            idx: 0,
        }
    }

    fn len(&self) -> usize {
        self.buf[0].len()
    }

    fn reset(&mut self) {
        self.buf[0].fill(0.0);
        self.buf[1].fill(0.0);
    }
}

struct Diffuser {
    buf: [Vec<f32>; 2],
    idx: usize,
}

impl Diffuser {
    fn new(len: usize) -> Self {
        Self {
            buf: [vec![0.0; len], vec![0.0; len]],
            idx: 0,
        }
    }

    fn reset(&mut self) {
        self.buf[0].fill(0.0);
        self.buf[1].fill(0.0);
    }
}

/// Four modulated delay lines with input diffusion, per-line damping,
/// and Hadamard-style feedback mixing
pub struct FdnReverb {
    base: EffectBase,
    sample_rate: u32,
    pre_delay: [PreDelay; 2],
    lines: Vec<FdnLine>,
    diffusers: Vec<Diffuser>,
    /// Damping filter per line and channel
    damp: [[OnePole; 2]; 4],
    /// LFO phase per line, cycles in [0, 1)
    phases: [f32; 4],
}

impl FdnReverb {
    /// Create the reverb at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        let info = EffectInfo::new("FDN Reverb", "Reverb")
            .with_param(
                ParamInfo::new("Decay", (2.0 - DECAY_MIN_S) / (DECAY_MAX_S - DECAY_MIN_S))
                    .with_range(DECAY_MIN_S, DECAY_MAX_S)
                    .with_unit("s"),
            )
            .with_param(
                ParamInfo::new("Pre-Delay", 0.5)
                    .with_range(0.0, 100.0)
                    .with_unit("ms"),
            )
            .with_param(ParamInfo::new("Damping", 0.5).with_range(0.0, 1.0))
            .with_param(ParamInfo::new("Diffusion", 0.7).with_range(0.0, 1.0))
            .with_param(
                ParamInfo::new("Room Size", (0.8 - ROOM_MIN) / (ROOM_MAX - ROOM_MIN))
                    .with_range(ROOM_MIN, ROOM_MAX),
            )
            .with_param(ParamInfo::new("Wet", 0.3).with_range(0.0, 1.0))
            .with_param(ParamInfo::new("Mod Depth", 0.2).with_range(0.0, 0.5))
            .with_param(
                ParamInfo::new("Mod Rate", 0.5)
                    .with_range(0.0, 2.0)
                    .with_unit("x"),
            );

        let base = EffectBase::new(info);
        let mut reverb = Self {
            base,
            sample_rate,
            pre_delay: [PreDelay::new(sample_rate, 0.0), PreDelay::new(sample_rate, 0.0)],
            lines: Vec::new(),
            diffusers: DIFFUSER_LENGTHS.iter().map(|&len| Diffuser::new(len)).collect(),
            damp: [[OnePole::default(); 2]; 4],
            phases: [0.0; 4],
        };
        reverb.rebuild();
        reverb.update_damping();
        reverb
    }

    fn rebuild(&mut self) {
        let room = self.base.param_actual(4);
        let pre_ms = self.base.param_actual(1);
        self.lines = DELAY_TIMES
            .iter()
            .map(|&t| FdnLine::new(((t * room) as usize).max(2)))
            .collect();
        self.pre_delay = [
            PreDelay::new(self.sample_rate, pre_ms),
            PreDelay::new(self.sample_rate, pre_ms),
        ];
    }

    fn update_damping(&mut self) {
        // Damping maps to a lowpass cutoff between 20 kHz (open) and 100 Hz
        let damping = self.base.param_actual(2);
        let freq = 20000.0 * (1.0 - damping) + 100.0;
        let alpha = OnePole::cutoff_alpha(freq, self.sample_rate);
        for line in &mut self.damp {
            for filter in line {
                filter.set_alpha(alpha);
            }
        }
    }
}

impl Effect for FdnReverb {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.base.is_bypassed() {
            return;
        }

        let decay = self.base.param_actual(0);
        let diffusion = self.base.param_actual(3);
        let wet = self.base.param_actual(5);
        let depth = self.base.param_actual(6);
        let rate_scale = self.base.param_actual(7);
        let feedback_gain = 0.25 * (1.0 / decay).sqrt();
        let dry = 1.0 - wet;

        for sample in buffer.iter_mut() {
            let input = [sample.left, sample.right];

            let pre_delayed = [
                self.pre_delay[0].process(input[0]),
                self.pre_delay[1].process(input[1]),
            ];

            // Input diffusion; both allpasses are fed the pre-delayed signal
            let mut diffused = pre_delayed;
            for ap in &mut self.diffusers {
                let len = ap.buf[0].len();
                let read = (ap.idx + len - DIFFUSER_TAP) % len;
                for c in 0..2 {
                    let delayed = ap.buf[c][read];
                    diffused[c] = diffused[c] * -diffusion + delayed;
                    ap.buf[c][ap.idx] = pre_delayed[c] + diffused[c] * diffusion;
                }
                ap.idx = (ap.idx + 1) % len;
            }

            let mut fdn_out = [0.0f32; 2];
            for (i, line) in self.lines.iter_mut().enumerate() {
                let len = line.len();
                let len_f = len as f32;

                // Modulated read position
                let modulation = depth * (2.0 * std::f32::consts::PI * self.phases[i]).sin();
                self.phases[i] =
                    (self.phases[i] + LFO_RATES[i] * rate_scale / self.sample_rate as f32) % 1.0;
                let offset = DELAY_TIMES[i] * (1.0 + modulation);
                let read = (((line.idx as f32 - offset).rem_euclid(len_f)) as usize).min(len - 1);

                for c in 0..2 {
                    let delayed = line.buf[c][read];
                    let damped = self.damp[i][c].process(delayed);
                    line.buf[c][line.idx] = diffused[c] + damped * feedback_gain;
                    fdn_out[c] += damped;
                }
                line.idx = (line.idx + 1) % len;
            }

            sample.left = input[0] * dry + fdn_out[0] * wet;
            sample.right = input[1] * dry + fdn_out[1] * wet;
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
        match index {
            1 | 4 => self.rebuild(),
            2 => self.update_damping(),
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.base.set_bypass(bypass);
    }

    fn is_bypassed(&self) -> bool {
        self.base.is_bypassed()
    }

    fn reset(&mut self) {
        for p in &mut self.pre_delay {
            p.reset();
        }
        for line in &mut self.lines {
            line.reset();
        }
        for ap in &mut self.diffusers {
            ap.reset();
        }
        for row in &mut self.damp {
            for filter in row {
                filter.reset();
            }
        }
        self.phases = [0.0; 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_creation() {
        let effect = FdnReverb::new(44100);
        assert_eq!(effect.info().name, "FDN Reverb");
        assert_eq!(effect.info().param_count(), 8);
    }

    #[test]
    fn test_zero_wet_is_identity() {
        let mut effect = FdnReverb::new(44100);
        effect.set_param(5, 0.0);

        let mut buffer = StereoBuffer::silence(256);
        buffer.as_mut_slice()[3] = StereoSample::new(0.5, -0.5);
        effect.process(&mut buffer);

        assert_eq!(buffer[3].left, 0.5);
        assert_eq!(buffer[3].right, -0.5);
    }

    #[test]
    fn test_impulse_produces_dense_tail() {
        let mut effect = FdnReverb::new(44100);
        effect.set_param(1, 0.0); // no pre-delay
        effect.set_param(5, 1.0); // full wet

        let mut buffer = StereoBuffer::silence(8192);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        effect.process(&mut buffer);

        // Shortest modulated line echoes within a few dozen samples; the
        // damping filters smear its energy across every following frame
        let nonzero = buffer.iter().skip(100).filter(|s| s.left.abs() > 1e-7).count();
        assert!(nonzero > 100, "expected a dense tail, got {} samples", nonzero);
    }

    #[test]
    fn test_reset_silences_tail() {
        let mut effect = FdnReverb::new(44100);
        effect.set_param(5, 1.0);

        let mut buffer = StereoBuffer::silence(4096);
        for s in buffer.iter_mut() {
            *s = StereoSample::mono(0.8);
        }
        effect.process(&mut buffer);
        effect.reset();

        let mut silence = StereoBuffer::silence(512);
        effect.process(&mut silence);
        assert_eq!(silence.peak(), 0.0);
    }
}
