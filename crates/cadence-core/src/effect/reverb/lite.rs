//! Compact reverb: four parallel combs into two serial diffusers

use crate::effect::dsp::{Delay, PreDelay};
use crate::effect::{Effect, EffectBase, EffectInfo, ParamInfo, ParamValue};
use crate::types::StereoBuffer;

/// Comb delay times in milliseconds, mutually prime-ish to spread echoes
const COMB_TIMES_MS: [f32; 4] = [29.7, 37.1, 43.7, 51.3];
/// Diffuser delay times in milliseconds
const ALLPASS_TIMES_MS: [f32; 2] = [5.0, 1.7];

const DECAY_MIN_S: f32 = 0.1;
const DECAY_MAX_S: f32 = 4.0;

/// Freeverb-style network scaled down for low cost
pub struct LiteReverb {
    base: EffectBase,
    sample_rate: u32,
    pre_delay: [PreDelay; 2],
    combs: Vec<[Delay; 2]>,
    allpasses: Vec<[Delay; 2]>,
}

impl LiteReverb {
    /// Create the reverb at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        let info = EffectInfo::new("Lite Reverb", "Reverb")
            .with_param(
                ParamInfo::new("Decay", (1.5 - DECAY_MIN_S) / (DECAY_MAX_S - DECAY_MIN_S))
                    .with_range(DECAY_MIN_S, DECAY_MAX_S)
                    .with_unit("s"),
            )
            .with_param(ParamInfo::new("Wet", 0.3).with_range(0.0, 1.0))
            .with_param(
                ParamInfo::new("Pre-Delay", 0.2)
                    .with_range(0.0, 100.0)
                    .with_unit("ms"),
            )
            .with_param(ParamInfo::new("Diffusion", 0.7).with_range(0.0, 1.0));

        let base = EffectBase::new(info);
        let mut reverb = Self {
            base,
            sample_rate,
            pre_delay: [PreDelay::new(sample_rate, 0.0), PreDelay::new(sample_rate, 0.0)],
            combs: Vec::new(),
            allpasses: Vec::new(),
        };
        reverb.rebuild();
        reverb
    }

    fn rebuild(&mut self) {
        let ms_to_samples = |ms: f32| ((ms * self.sample_rate as f32 / 1000.0) as usize).max(1);
        let pre_ms = self.base.param_actual(2);

        self.pre_delay = [
            PreDelay::new(self.sample_rate, pre_ms),
            PreDelay::new(self.sample_rate, pre_ms),
        ];
        self.combs = COMB_TIMES_MS
            .iter()
            .map(|&t| {
                let len = ms_to_samples(t);
                [Delay::new(len), Delay::new(len)]
            })
            .collect();
        self.allpasses = ALLPASS_TIMES_MS
            .iter()
            .map(|&t| {
                let len = ms_to_samples(t);
                [Delay::new(len), Delay::new(len)]
            })
            .collect();
    }
}

impl Effect for LiteReverb {
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
        let diffusion = self.base.param_actual(3);
        let comb_feedback = 0.93_f32.powf(1.0 / (decay * 4.0));

        for sample in buffer.iter_mut() {
            let input = [sample.left, sample.right];
            let mut out = [0.0f32; 2];
            for c in 0..2 {
                let delayed_in = self.pre_delay[c].process(input[c]);

                // Parallel combs
                let mut comb_sum = 0.0;
                for comb in &mut self.combs {
                    let delayed = comb[c].front();
                    comb[c].push(delayed_in + delayed * comb_feedback);
                    comb_sum += delayed;
                }

                // Serial diffusers
                let mut ap = comb_sum;
                for allpass in &mut self.allpasses {
                    let delayed = allpass[c].front();
                    let v = delayed - ap;
                    allpass[c].push(v * diffusion + delayed * (1.0 - diffusion));
                    ap = delayed + v * diffusion;
                }

                out[c] = input[c] * dry + ap * wet;
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
        if index == 2 {
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
        for p in &mut self.pre_delay {
            p.reset();
        }
        for comb in &mut self.combs {
            comb[0].reset();
            comb[1].reset();
        }
        for ap in &mut self.allpasses {
            ap[0].reset();
            ap[1].reset();
        }
    }
}
