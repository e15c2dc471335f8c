//! Plate reverb: tapped early reflections into a damped comb bank
//!
//! Classic plate topology: pre-delay, an 18-tap early-reflection line,
//! eight parallel damped combs scaled by room size, and four serial
//! Schroeder allpasses for diffusion. Each stereo side runs its own
//! filter bank.

use crate::effect::dsp::{AllpassFilter, ModulatedCombFilter, PreDelay, TapDelayLine};
use crate::effect::{Effect, EffectBase, EffectInfo, ParamInfo, ParamValue};
use crate::types::StereoBuffer;

/// Early-reflection tap positions in samples
const TAP_DELAYS: [usize; 18] = [
    190, 949, 993, 1183, 1192, 1315, 2021, 2140, 2524, 2590, 2625, 2700, 3119, 3123, 3202, 3268,
    3321, 3515,
];
/// Early-reflection tap gains
const TAP_GAINS: [f32; 18] = [
    0.841, 0.504, 0.49, 0.379, 0.38, 0.346, 0.289, 0.272, 0.192, 0.193, 0.217, 0.181, 0.18, 0.181,
    0.176, 0.142, 0.167, 0.134,
];
/// Comb delay lengths in samples before room scaling
const COMB_LENGTHS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
/// Diffusion allpass lengths in samples
const ALLPASS_LENGTHS: [usize; 4] = [556, 441, 341, 225];
/// Diffusion allpass feedback gain
const ALLPASS_GAIN: f32 = 0.55;

/// One stereo side's filter bank
struct SideBank {
    pre_delay: PreDelay,
    taps: TapDelayLine,
    combs: Vec<ModulatedCombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl SideBank {
    fn new(sample_rate: u32, pre_ms: f32, scale: f32, feedback: f32, hdamp: f32) -> Self {
        Self {
            pre_delay: PreDelay::new(sample_rate, pre_ms),
            taps: TapDelayLine::new(&TAP_DELAYS, &TAP_GAINS),
            combs: COMB_LENGTHS
                .iter()
                .map(|&len| {
                    ModulatedCombFilter::new((len as f32 * (scale + 0.5)) as usize, feedback, hdamp)
                })
                .collect(),
            allpasses: ALLPASS_LENGTHS
                .iter()
                .map(|&len| AllpassFilter::new(len, ALLPASS_GAIN))
                .collect(),
        }
    }

    fn process(&mut self, input: f32, er_gain: f32, wet: f32, dry: f32) -> f32 {
        let x = self.pre_delay.process(input);
        let er = self.taps.process(x) * er_gain;

        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(x);
        }
        for ap in &mut self.allpasses {
            out = ap.process(out);
        }

        (er + out) * wet + x * dry
    }

    fn reset(&mut self) {
        self.pre_delay.reset();
        self.taps.reset();
        for comb in &mut self.combs {
            comb.reset();
        }
        for ap in &mut self.allpasses {
            ap.reset();
        }
    }
}

/// Plate reverb with per-side comb banks
///
/// All parameters use 0-100 scales except where labeled.
pub struct PlateReverb {
    base: EffectBase,
    sample_rate: u32,
    banks: [SideBank; 2],
}

impl PlateReverb {
    /// Create the reverb at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        let info = EffectInfo::new("Plate Reverb", "Reverb")
            .with_param(ParamInfo::new("Room Scale", 0.5).with_range(0.0, 100.0))
            .with_param(
                ParamInfo::new("Pre-Delay", 0.5)
                    .with_range(0.0, 100.0)
                    .with_unit("ms"),
            )
            .with_param(ParamInfo::new("Wet", 0.2).with_range(0.0, 100.0))
            .with_param(ParamInfo::new("Dry", 0.0).with_range(0.0, 100.0))
            .with_param(ParamInfo::new("Damping", 0.3).with_range(0.0, 100.0))
            .with_param(ParamInfo::new("Reverberance", 0.23).with_range(0.0, 100.0))
            .with_param(ParamInfo::new("Stereo Width", 0.2).with_range(0.0, 100.0))
            .with_param(ParamInfo::new("ER Gain", 0.2).with_range(0.0, 100.0));

        let base = EffectBase::new(info);
        let mut reverb = Self {
            base,
            sample_rate,
            banks: [
                SideBank::new(sample_rate, 0.0, 0.1, 0.0, 0.0),
                SideBank::new(sample_rate, 0.0, 0.1, 0.0, 0.0),
            ],
        };
        reverb.rebuild();
        reverb
    }

    /// Comb feedback from reverberance, mapped through the decay curve
    fn feedback(&self) -> f32 {
        let r = self.base.param_actual(5) / 100.0;
        let b = 100.0 / ((1.0f32 - 0.98).ln() * (-1.0 / (1.0f32 - 0.3).ln()));
        1.0 - ((r - b) / (b + 1.0)).exp()
    }

    fn rebuild(&mut self) {
        let scale = self.base.param_actual(0) / 100.0 * 0.9 + 0.1;
        let pre_ms = self.base.param_actual(1);
        let hdamp = self.base.param_actual(4) / 100.0 * 0.3 + 0.2;
        let feedback = self.feedback();
        self.banks = [
            SideBank::new(self.sample_rate, pre_ms, scale, feedback, hdamp),
            SideBank::new(self.sample_rate, pre_ms, scale, feedback, hdamp),
        ];
    }
}

impl Effect for PlateReverb {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.base.is_bypassed() {
            return;
        }

        let wet = self.base.param_actual(2) / 100.0;
        let dry = self.base.param_actual(3) / 100.0;
        let width = self.base.param_actual(6) / 100.0;
        let er_gain = self.base.param_actual(7) / 100.0 * (width / 2.0 + 0.5);

        for sample in buffer.iter_mut() {
            sample.left = self.banks[0].process(sample.left, er_gain, wet, dry);
            sample.right = self.banks[1].process(sample.right, er_gain, wet, dry);
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
        // Room, pre-delay, damping, and reverberance live inside the banks
        if matches!(index, 0 | 1 | 4 | 5) {
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
        for bank in &mut self.banks {
            bank.reset();
        }
    }
}
