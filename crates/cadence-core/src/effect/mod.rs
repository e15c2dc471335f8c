//! Effect system - traits, chains, and parameter mapping
//!
//! All DSP effects implement the [`Effect`] trait and are hosted in an
//! [`EffectStage`], which composes them either in parallel (each effect
//! processes the dry input, outputs are summed) or in series. A panicking
//! effect is permanently bypassed and reported; the rest of the chain keeps
//! running.

pub mod dsp;
pub mod eq;
pub mod reverb;

pub use eq::ShelfEqEffect;
pub use reverb::{
    ConvolutionReverb, FdnReverb, HallReverb, LiteReverb, PlateReverb, UltraLightReverb,
};

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::types::StereoBuffer;

/// Information about an effect parameter
#[derive(Debug, Clone)]
pub struct ParamInfo {
    /// Parameter name for display
    pub name: String,
    /// Default value (0.0-1.0)
    pub default: f32,
    /// Minimum value (typically 0.0)
    pub min: f32,
    /// Maximum value (typically 1.0)
    pub max: f32,
    /// Unit label (e.g., "ms", "dB", "%")
    pub unit: String,
}

impl Default for ParamInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            default: 0.5,
            min: 0.0,
            max: 1.0,
            unit: String::new(),
        }
    }
}

impl ParamInfo {
    /// Create a new parameter info with name and default value
    pub fn new(name: impl Into<String>, default: f32) -> Self {
        Self {
            name: name.into(),
            default,
            ..Default::default()
        }
    }

    /// Set the value range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the unit label
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Current parameter value with display formatting
#[derive(Debug, Clone, Copy)]
pub struct ParamValue {
    /// Normalized value (0.0-1.0)
    pub normalized: f32,
    /// Actual value after range mapping
    pub actual: f32,
}

impl Default for ParamValue {
    fn default() -> Self {
        Self {
            normalized: 0.5,
            actual: 0.5,
        }
    }
}

impl ParamValue {
    /// Create a new parameter value
    pub fn new(normalized: f32, actual: f32) -> Self {
        Self { normalized, actual }
    }

    /// Create from normalized value with the given param info
    pub fn from_normalized(normalized: f32, info: &ParamInfo) -> Self {
        let normalized = normalized.clamp(0.0, 1.0);
        let actual = info.min + normalized * (info.max - info.min);
        Self { normalized, actual }
    }
}

/// Information about an effect
#[derive(Debug, Clone)]
pub struct EffectInfo {
    /// Effect name for display
    pub name: String,
    /// Effect category (e.g., "EQ", "Reverb")
    pub category: String,
    /// Parameter descriptions
    pub params: Vec<ParamInfo>,
}

impl EffectInfo {
    /// Create a new effect info
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter to this effect
    pub fn with_param(mut self, param: ParamInfo) -> Self {
        self.params.push(param);
        self
    }

    /// Get the number of parameters
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// The core effect trait - implemented by all audio effects
///
/// Effects process stereo buffers in-place at the sample rate they were
/// constructed for. All parameters are normalized (0.0-1.0) for easy
/// mapping to UI controls.
pub trait Effect: Send {
    /// Process a stereo buffer in-place
    fn process(&mut self, buffer: &mut StereoBuffer);

    /// Get information about this effect (name, category, parameters)
    fn info(&self) -> &EffectInfo;

    /// Get the current parameter values
    fn get_params(&self) -> &[ParamValue];

    /// Set a parameter by index (normalized value 0.0-1.0)
    fn set_param(&mut self, index: usize, value: f32);

    /// Set the bypass state
    fn set_bypass(&mut self, bypass: bool);

    /// Check if the effect is bypassed
    fn is_bypassed(&self) -> bool;

    /// Reset the effect state (clears delay lines and filter memory)
    fn reset(&mut self);
}

/// Base implementation helper for effects
///
/// Provides common functionality like bypass state and parameter storage.
#[derive(Debug, Clone)]
pub struct EffectBase {
    info: EffectInfo,
    params: Vec<ParamValue>,
    bypassed: bool,
}

impl EffectBase {
    /// Create a new effect base from effect info
    pub fn new(info: EffectInfo) -> Self {
        let params: Vec<ParamValue> = info
            .params
            .iter()
            .map(|p| ParamValue::from_normalized(p.default, p))
            .collect();
        Self {
            info,
            params,
            bypassed: false,
        }
    }

    /// Get the effect info
    pub fn info(&self) -> &EffectInfo {
        &self.info
    }

    /// Get the current parameter values
    pub fn get_params(&self) -> &[ParamValue] {
        &self.params
    }

    /// Set a parameter value
    pub fn set_param(&mut self, index: usize, value: f32) {
        if index < self.params.len() {
            self.params[index] = ParamValue::from_normalized(value, &self.info.params[index]);
        }
    }

    /// Get a parameter's actual (denormalized) value
    pub fn param_actual(&self, index: usize) -> f32 {
        self.params.get(index).map(|p| p.actual).unwrap_or(0.0)
    }

    /// Get a parameter's normalized value
    pub fn param_normalized(&self, index: usize) -> f32 {
        self.params.get(index).map(|p| p.normalized).unwrap_or(0.0)
    }

    /// Set bypass state
    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    /// Check if bypassed
    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}

/// How an [`EffectStage`] combines its effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionMode {
    /// Each effect processes the dry input; outputs are summed
    #[default]
    Parallel,
    /// Effects process in order, each feeding the next
    Serial,
}

struct EffectSlot {
    effect: Box<dyn Effect>,
    /// Set when the effect panicked; the slot is skipped from then on
    faulted: bool,
}

/// A chain of effects with a composition mode and fault isolation
///
/// An empty stage is an identity transform. Effects that panic during
/// processing are marked faulted, skipped on all later calls, and their
/// names returned so the host can report them.
#[derive(Default)]
pub struct EffectStage {
    slots: Vec<EffectSlot>,
    mode: CompositionMode,
    scratch: StereoBuffer,
    mix: StereoBuffer,
}

impl EffectStage {
    /// Create an empty stage with the given composition mode
    pub fn new(mode: CompositionMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Add an effect to the end of the chain
    pub fn add(&mut self, effect: Box<dyn Effect>) {
        self.slots.push(EffectSlot {
            effect,
            faulted: false,
        });
    }

    /// Remove all effects
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of effects in the chain (including faulted ones)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the chain holds no effects
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The current composition mode
    pub fn mode(&self) -> CompositionMode {
        self.mode
    }

    /// Change the composition mode
    pub fn set_mode(&mut self, mode: CompositionMode) {
        self.mode = mode;
    }

    /// Mutable access to an effect for parameter changes
    pub fn get_mut(&mut self, index: usize) -> Option<&mut dyn Effect> {
        self.slots.get_mut(index).map(|s| s.effect.as_mut() as &mut dyn Effect)
    }

    /// Effect infos in chain order
    pub fn infos(&self) -> Vec<EffectInfo> {
        self.slots.iter().map(|s| s.effect.info().clone()).collect()
    }

    /// Reset every effect's state
    pub fn reset_all(&mut self) {
        for slot in &mut self.slots {
            slot.effect.reset();
        }
    }

    /// Run the chain over `buffer` in-place
    ///
    /// Returns the names of effects that panicked during this call. A
    /// faulted effect contributes nothing in parallel mode and passes the
    /// signal through unchanged in serial mode.
    pub fn process(&mut self, buffer: &mut StereoBuffer) -> Vec<String> {
        if self.slots.is_empty() {
            return Vec::new();
        }

        let mut new_faults = Vec::new();
        match self.mode {
            CompositionMode::Parallel => {
                self.mix.resize(buffer.len());
                self.mix.fill_silence();
                self.scratch.resize(buffer.len());
                let mut contributed = 0usize;

                for slot in &mut self.slots {
                    if slot.faulted {
                        continue;
                    }
                    self.scratch.copy_from(buffer);
                    let scratch = &mut self.scratch;
                    let ok = catch_unwind(AssertUnwindSafe(|| {
                        slot.effect.process(scratch);
                    }))
                    .is_ok();
                    if ok {
                        self.mix.add_buffer(&self.scratch);
                        contributed += 1;
                    } else {
                        slot.faulted = true;
                        let name = slot.effect.info().name.clone();
                        log::warn!("Effect '{}' panicked, bypassing permanently", name);
                        new_faults.push(name);
                    }
                }

                if contributed > 0 {
                    buffer.copy_from(&self.mix);
                }
            }
            CompositionMode::Serial => {
                for slot in &mut self.slots {
                    if slot.faulted {
                        continue;
                    }
                    let ok = catch_unwind(AssertUnwindSafe(|| {
                        slot.effect.process(buffer);
                    }))
                    .is_ok();
                    if !ok {
                        slot.faulted = true;
                        let name = slot.effect.info().name.clone();
                        log::warn!("Effect '{}' panicked, bypassing permanently", name);
                        new_faults.push(name);
                    }
                }
            }
        }
        new_faults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    struct GainTestEffect {
        base: EffectBase,
        gain: f32,
    }

    impl GainTestEffect {
        fn new(gain: f32) -> Self {
            Self {
                base: EffectBase::new(EffectInfo::new("Gain", "Test")),
                gain,
            }
        }
    }

    impl Effect for GainTestEffect {
        fn process(&mut self, buffer: &mut StereoBuffer) {
            buffer.scale(self.gain);
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
        fn reset(&mut self) {}
    }

    struct PanicEffect {
        base: EffectBase,
    }

    impl PanicEffect {
        fn new() -> Self {
            Self {
                base: EffectBase::new(EffectInfo::new("Broken", "Test")),
            }
        }
    }

    impl Effect for PanicEffect {
        fn process(&mut self, _buffer: &mut StereoBuffer) {
            panic!("effect blew up");
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
        fn reset(&mut self) {}
    }

    #[test]
    fn test_param_value_mapping() {
        let info = ParamInfo::new("Test", 0.5).with_range(0.0, 100.0);

        let value = ParamValue::from_normalized(0.5, &info);
        assert_eq!(value.normalized, 0.5);
        assert_eq!(value.actual, 50.0);

        let value = ParamValue::from_normalized(1.0, &info);
        assert_eq!(value.actual, 100.0);
    }

    #[test]
    fn test_effect_base() {
        let info = EffectInfo::new("Test", "Test")
            .with_param(ParamInfo::new("P1", 0.5).with_range(0.0, 100.0))
            .with_param(ParamInfo::new("P2", 0.0).with_range(-1.0, 1.0));

        let mut base = EffectBase::new(info);
        assert_eq!(base.param_actual(0), 50.0);
        assert_eq!(base.param_actual(1), -1.0);

        base.set_param(0, 1.0);
        assert_eq!(base.param_actual(0), 100.0);

        assert!(!base.is_bypassed());
        base.set_bypass(true);
        assert!(base.is_bypassed());
    }

    #[test]
    fn test_empty_stage_is_identity() {
        let mut stage = EffectStage::new(CompositionMode::Parallel);
        let mut buffer = StereoBuffer::silence(64);
        buffer.as_mut_slice()[10] = StereoSample::new(0.7, -0.3);

        let faults = stage.process(&mut buffer);

        assert!(faults.is_empty());
        assert_eq!(buffer[10].left, 0.7);
        assert_eq!(buffer[10].right, -0.3);
    }

    #[test]
    fn test_parallel_sums_outputs() {
        let mut stage = EffectStage::new(CompositionMode::Parallel);
        stage.add(Box::new(GainTestEffect::new(0.5)));
        stage.add(Box::new(GainTestEffect::new(0.25)));

        let mut buffer = StereoBuffer::silence(8);
        for s in buffer.iter_mut() {
            *s = StereoSample::mono(1.0);
        }
        stage.process(&mut buffer);

        // 1.0 * 0.5 + 1.0 * 0.25
        assert!((buffer[0].left - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_serial_chains_outputs() {
        let mut stage = EffectStage::new(CompositionMode::Serial);
        stage.add(Box::new(GainTestEffect::new(0.5)));
        stage.add(Box::new(GainTestEffect::new(0.5)));

        let mut buffer = StereoBuffer::silence(8);
        for s in buffer.iter_mut() {
            *s = StereoSample::mono(1.0);
        }
        stage.process(&mut buffer);

        assert!((buffer[0].left - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_panicking_effect_is_bypassed_permanently() {
        let mut stage = EffectStage::new(CompositionMode::Parallel);
        stage.add(Box::new(PanicEffect::new()));
        stage.add(Box::new(GainTestEffect::new(0.5)));

        let mut buffer = StereoBuffer::silence(8);
        for s in buffer.iter_mut() {
            *s = StereoSample::mono(1.0);
        }

        let faults = stage.process(&mut buffer);
        assert_eq!(faults, vec!["Broken".to_string()]);
        // Surviving effect still ran
        assert!((buffer[0].left - 0.5).abs() < 1e-6);

        // Second call: no new faults, same output
        for s in buffer.iter_mut() {
            *s = StereoSample::mono(1.0);
        }
        let faults = stage.process(&mut buffer);
        assert!(faults.is_empty());
        assert!((buffer[0].left - 0.5).abs() < 1e-6);
    }
}
