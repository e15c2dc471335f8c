//! Minimal reverb: one feedback delay line with damping

use crate::effect::dsp::{Delay, OnePole, PreDelay};
use crate::effect::{Effect, EffectBase, EffectInfo, ParamInfo, ParamValue};
use crate::types::StereoBuffer;

const DECAY_MIN_S: f32 = 0.1;
const DECAY_MAX_S: f32 = 4.0;

/// Cheapest reverb tier: pre-delay into a single feedback delay line,
/// read at the half-way tap, with one-pole damping in the loop
pub struct UltraLightReverb {
    base: EffectBase,
    sample_rate: u32,
    delay: [Delay; 2],
    pre_delay: [PreDelay; 2],
    damp: [OnePole; 2],
}

impl UltraLightReverb {
    /// Create the reverb at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        let info = EffectInfo::new("UltraLight Reverb", "Reverb")
            .with_param(
                ParamInfo::new("Decay", (1.0 - DECAY_MIN_S) / (DECAY_MAX_S - DECAY_MIN_S))
                    .with_range(DECAY_MIN_S, DECAY_MAX_S)
                    .with_unit("s"),
            )
            .with_param(ParamInfo::new("Wet", 0.3).with_range(0.0, 1.0))
            .with_param(
                ParamInfo::new("Pre-Delay", 0.04)
                    .with_range(0.0, 50.0)
                    .with_unit("ms"),
            )
            .with_param(ParamInfo::new("Damping", 0.2).with_range(0.0, 1.0));

        let base = EffectBase::new(info);
        let mut reverb = Self {
            base,
            sample_rate,
            delay: [Delay::new(1), Delay::new(1)],
            pre_delay: [PreDelay::new(sample_rate, 0.0), PreDelay::new(sample_rate, 0.0)],
            damp: [OnePole::default(), OnePole::default()],
        };
        reverb.rebuild();
        reverb
    }

    /// Resize delay lines from the current structural parameters
    fn rebuild(&mut self) {
        let decay = self.base.param_actual(0);
        let pre_ms = self.base.param_actual(2);
        let damping = self.base.param_actual(3);
        let delay_samples = ((decay * self.sample_rate as f32) as usize).max(2);

        self.delay = [Delay::new(delay_samples), Delay::new(delay_samples)];
        self.pre_delay = [
            PreDelay::new(self.sample_rate, pre_ms),
            PreDelay::new(self.sample_rate, pre_ms),
        ];
        self.damp = [OnePole::new(damping), OnePole::new(damping)];
    }
}

impl Effect for UltraLightReverb {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.base.is_bypassed() {
            return;
        }

        let wet = self.base.param_actual(1);
        if wet < 0.01 {
            return;
        }
        let dry = 1.0 - wet;
        let decay = self.base.param_actual(0);
        let feedback = 0.97_f32.powf(1.0 / decay);
        let half = self.delay[0].len() / 2;

        for sample in buffer.iter_mut() {
            let input = [sample.left, sample.right];
            let mut out = [0.0f32; 2];
            for c in 0..2 {
                let delayed_in = self.pre_delay[c].process(input[c]);
                let delayed = self.delay[c].go_back(half);
                let damped = self.damp[c].process(delayed);
                self.delay[c].push(delayed_in + damped * feedback);
                out[c] = input[c] * dry + damped * wet;
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
        // Decay and pre-delay size the lines; damping lives in the filters
        if index == 0 || index == 2 || index == 3 {
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
        for d in &mut self.delay {
            d.reset();
        }
        for p in &mut self.pre_delay {
            p.reset();
        }
        for f in &mut self.damp {
            f.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_creation() {
        let effect = UltraLightReverb::new(44100);
        assert_eq!(effect.info().name, "UltraLight Reverb");
        assert_eq!(effect.info().param_count(), 4);
    }

    #[test]
    fn test_zero_wet_is_identity() {
        let mut effect = UltraLightReverb::new(44100);
        effect.set_param(1, 0.0);

        let mut buffer = StereoBuffer::silence(64);
        buffer.as_mut_slice()[0] = StereoSample::new(0.8, 0.8);
        effect.process(&mut buffer);

        assert_eq!(buffer[0].left, 0.8);
    }

    #[test]
    fn test_impulse_produces_tail() {
        let mut effect = UltraLightReverb::new(44100);
        effect.set_param(1, 1.0); // full wet

        // Half-line tap at 1s decay sits near 22050 samples
        let mut buffer = StereoBuffer::silence(44100);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        effect.process(&mut buffer);

        let tail_energy: f32 = buffer
            .iter()
            .skip(20000)
            .map(|s| s.left.abs() + s.right.abs())
            .sum();
        assert!(tail_energy > 0.0, "expected delayed energy in the tail");
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut effect = UltraLightReverb::new(44100);
        effect.set_param(1, 1.0);

        let mut buffer = StereoBuffer::silence(44100);
        for s in buffer.iter_mut() {
            *s = StereoSample::mono(0.9);
        }
        effect.process(&mut buffer);
        effect.reset();

        let mut silence = StereoBuffer::silence(1024);
        effect.process(&mut silence);
        assert_eq!(silence.peak(), 0.0);
    }
}
