//! Early-reflection / late-reverb split design
//!
//! Three long delay lines: the newest taps form early reflections and the
//! cross-coupled injections, the oldest taps form the late wet signal.

use crate::effect::dsp::Delay;
use crate::effect::{Effect, EffectBase, EffectInfo, ParamInfo, ParamValue};
use crate::types::StereoBuffer;

const DECAY_MIN_S: f32 = 0.1;
const DECAY_MAX_S: f32 = 4.0;
const DAMP_MIN: f32 = 0.05;
const DAMP_MAX: f32 = 1.0;

/// Hall reverb with separate early-reflection and late-tail paths
pub struct HallReverb {
    base: EffectBase,
    sample_rate: u32,
    lines: [[Delay; 2]; 3],
}

impl HallReverb {
    /// Create the reverb at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        let info = EffectInfo::new("Hall Reverb", "Reverb")
            .with_param(ParamInfo::new("Wet", 0.5).with_range(0.0, 1.0))
            .with_param(ParamInfo::new("Dry", 0.5).with_range(0.0, 1.0))
            .with_param(
                ParamInfo::new("Pre-Delay", 0.2)
                    .with_range(0.0, 100.0)
                    .with_unit("ms"),
            )
            .with_param(ParamInfo::new("Room Size", 0.6).with_range(0.0, 1.0))
            .with_param(ParamInfo::new("Early Reflections", 0.2).with_range(0.0, 1.0))
            .with_param(
                ParamInfo::new("Damping", (0.5 - DAMP_MIN) / (DAMP_MAX - DAMP_MIN))
                    .with_range(DAMP_MIN, DAMP_MAX),
            )
            .with_param(ParamInfo::new("Diffusion", 0.5).with_range(0.0, 1.0))
            .with_param(
                ParamInfo::new("Decay", (1.5 - DECAY_MIN_S) / (DECAY_MAX_S - DECAY_MIN_S))
                    .with_range(DECAY_MIN_S, DECAY_MAX_S)
                    .with_unit("s"),
            );

        let base = EffectBase::new(info);
        let mut reverb = Self {
            base,
            sample_rate,
            lines: [
                [Delay::new(1), Delay::new(1)],
                [Delay::new(1), Delay::new(1)],
                [Delay::new(1), Delay::new(1)],
            ],
        };
        reverb.rebuild();
        reverb
    }

    fn rebuild(&mut self) {
        let decay = self.base.param_actual(7);
        let pre_s = self.base.param_actual(2) / 1000.0;
        let frames = ((self.sample_rate as f32 * (decay + pre_s)) as usize).max(2);
        self.lines = [
            [Delay::new(frames), Delay::new(frames)],
            [Delay::new(frames), Delay::new(frames)],
            [Delay::new(frames), Delay::new(frames)],
        ];
    }
}

impl Effect for HallReverb {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.base.is_bypassed() {
            return;
        }

        let wet = self.base.param_actual(0);
        let dry = self.base.param_actual(1);
        let room = self.base.param_actual(3);
        let er_gain = self.base.param_actual(4);
        let damping = self.base.param_actual(5);
        let diffusion = self.base.param_actual(6);
        let decay = self.base.param_actual(7);

        let reflection_feedback = 0.3 * room;
        let reverb_feedback = 0.7 * room;
        // Pole of the one-pole lowpass in the first line's injection
        let damping_factor = (-damping).exp();
        let decay_factor = (-1.0 / decay).exp();

        for sample in buffer.iter_mut() {
            let input = [sample.left, sample.right];
            let mut out = [0.0f32; 2];
            let [line1, line2, line3] = &mut self.lines;
            for c in 0..2 {
                let x = input[c];
                let l1 = &mut line1[c];
                let l2 = &mut line2[c];
                let l3 = &mut line3[c];

                let n1 = l1.go_back(1);
                let n2 = l2.go_back(1);
                let n3 = l3.go_back(1);
                let er = er_gain * (n1 + n2 + n3);
                let reverb_out = reflection_feedback * er + reverb_feedback * n1;

                let oldest = l1.front() + l2.front() + l3.front();
                l1.push(x + reflection_feedback * er + damping_factor * n1);
                l2.push(x + reverb_feedback * reverb_out);
                l3.push(x + diffusion * reverb_out);

                out[c] = dry * x + wet * decay_factor * oldest;
            }
            sample.left = out[0];
            sample.right = out[1];
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
        // Decay and pre-delay size the lines
        if index == 2 || index == 7 {
            self.rebuild();
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.base.set_bypass(bypass);
    }

    fn is_bypassed(&self) -> bool {
        self.base.is_bypassed()
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line[0].reset();
            line[1].reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_creation() {
        let effect = HallReverb::new(44100);
        assert_eq!(effect.info().name, "Hall Reverb");
        assert_eq!(effect.info().param_count(), 8);
    }

    #[test]
    fn test_dry_only_is_scaled_input() {
        let mut effect = HallReverb::new(44100);
        effect.set_param(0, 0.0); // wet off
        effect.set_param(1, 1.0); // dry full

        let mut buffer = StereoBuffer::silence(128);
        buffer.as_mut_slice()[5] = StereoSample::new(0.4, 0.4);
        effect.process(&mut buffer);

        assert_eq!(buffer[5].left, 0.4);
        assert_eq!(buffer[6].left, 0.0);
    }

    #[test]
    fn test_late_tail_arrives_after_line_length() {
        let mut effect = HallReverb::new(44100);
        effect.set_param(0, 1.0); // full wet
        effect.set_param(1, 0.0); // no dry
        effect.set_param(2, 0.0); // no pre-delay
        effect.set_param(7, 0.0); // shortest decay, 0.1 s lines

        let mut buffer = StereoBuffer::silence(8192);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        effect.process(&mut buffer);

        // Before the 4410-frame line length only early coupling circulates,
        // which never reaches the output directly
        let early: f32 = buffer.iter().take(4000).map(|s| s.left.abs()).sum();
        let late: f32 = buffer.iter().skip(4400).map(|s| s.left.abs()).sum();
        assert_eq!(early, 0.0);
        assert!(late > 0.0, "expected the oldest taps to emit the tail");
    }

    #[test]
    fn test_constant_input_stays_bounded() {
        let mut effect = HallReverb::new(44100);
        effect.set_param(0, 1.0);

        let mut buffer = StereoBuffer::silence(44100);
        for s in buffer.iter_mut() {
            *s = StereoSample::mono(0.5);
        }
        effect.process(&mut buffer);
        effect.process(&mut buffer);

        assert!(buffer.peak().is_finite());
        assert!(buffer.peak() < 50.0, "feedback must not diverge");
    }
}
