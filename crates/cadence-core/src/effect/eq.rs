//! Shelf EQ effect - biquad low-shelf boost/cut
//!
//! Coefficients follow the standard analog-prototype bilinear-transform
//! shelf design. Filter state persists across calls; output is hard-clipped
//! to [-1, 1].

use crate::effect::{Effect, EffectBase, EffectInfo, ParamInfo, ParamValue};
use crate::types::StereoBuffer;

const GAIN_MIN_DB: f32 = -24.0;
const GAIN_MAX_DB: f32 = 24.0;
const FREQ_MIN_HZ: f32 = 20.0;
const FREQ_MAX_HZ: f32 = 1000.0;
const DEFAULT_FREQ_HZ: f32 = 100.0;

/// Biquad filter state, one per stereo pair
#[derive(Debug, Clone, Default)]
struct BiquadState {
    x1_l: f32, x2_l: f32, y1_l: f32, y2_l: f32,
    x1_r: f32, x2_r: f32, y1_r: f32, y2_r: f32,
}

impl BiquadState {
    fn process(&mut self, input_l: f32, input_r: f32, coeffs: &BiquadCoeffs) -> (f32, f32) {
        // Left channel
        let out_l = coeffs.b0 * input_l + coeffs.b1 * self.x1_l + coeffs.b2 * self.x2_l
                  - coeffs.a1 * self.y1_l - coeffs.a2 * self.y2_l;
        self.x2_l = self.x1_l;
        self.x1_l = input_l;
        self.y2_l = self.y1_l;
        self.y1_l = out_l;

        // Right channel
        let out_r = coeffs.b0 * input_r + coeffs.b1 * self.x1_r + coeffs.b2 * self.x2_r
                  - coeffs.a1 * self.y1_r - coeffs.a2 * self.y2_r;
        self.x2_r = self.x1_r;
        self.x1_r = input_r;
        self.y2_r = self.y1_r;
        self.y1_r = out_r;

        (out_l, out_r)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Biquad filter coefficients
#[derive(Debug, Clone)]
struct BiquadCoeffs {
    b0: f32, b1: f32, b2: f32,
    a1: f32, a2: f32,
}

impl BiquadCoeffs {
    /// Create low shelf filter coefficients
    /// gain_db: boost/cut in dB, freq: shelf frequency
    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0/a) * (1.0/0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }
}

/// Low-shelf EQ for bass boost/cut
///
/// Parameters:
/// - Gain: shelf gain in dB (-24 to +24, 0 = flat)
/// - Frequency: shelf corner frequency in Hz
pub struct ShelfEqEffect {
    base: EffectBase,
    sample_rate: u32,
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl ShelfEqEffect {
    /// Create a new shelf EQ at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        let info = EffectInfo::new("Shelf EQ", "EQ")
            .with_param(
                ParamInfo::new("Gain", 0.5)
                    .with_range(GAIN_MIN_DB, GAIN_MAX_DB)
                    .with_unit("dB"),
            )
            .with_param(
                ParamInfo::new(
                    "Frequency",
                    (DEFAULT_FREQ_HZ - FREQ_MIN_HZ) / (FREQ_MAX_HZ - FREQ_MIN_HZ),
                )
                .with_range(FREQ_MIN_HZ, FREQ_MAX_HZ)
                .with_unit("Hz"),
            );

        let base = EffectBase::new(info);
        let coeffs =
            BiquadCoeffs::low_shelf(base.param_actual(1), base.param_actual(0), sample_rate as f32);
        Self {
            base,
            sample_rate,
            coeffs,
            state: BiquadState::default(),
        }
    }

    fn update_coeffs(&mut self) {
        self.coeffs = BiquadCoeffs::low_shelf(
            self.base.param_actual(1),
            self.base.param_actual(0),
            self.sample_rate as f32,
        );
    }
}

impl Effect for ShelfEqEffect {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.base.is_bypassed() {
            return;
        }

        // Flat gain: no filtering, keep the signal bit-exact
        if self.base.param_actual(0).abs() < 0.01 {
            return;
        }

        for sample in buffer.iter_mut() {
            let (l, r) = self.state.process(sample.left, sample.right, &self.coeffs);
            sample.left = l.clamp(-1.0, 1.0);
            sample.right = r.clamp(-1.0, 1.0);
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
        self.update_coeffs();
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.base.set_bypass(bypass);
    }

    fn is_bypassed(&self) -> bool {
        self.base.is_bypassed()
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}
