//! Fade envelopes applied during buffer production

use crate::types::StereoBuffer;

/// Shape of the fade ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeCurve {
    /// Straight-line ramp
    Linear,
    /// Squared ramp, steeper near silence
    #[default]
    Exponential,
}

/// Fade-in/fade-out window state
///
/// One whole-buffer scale factor is computed from the position at buffer
/// entry, so the envelope advances in buffer-sized steps. Only one window
/// is active at a time; fade-in wins when both are armed. A completed
/// fade-out is a stop condition for the owning channel, a completed
/// fade-in is not.
#[derive(Debug, Default, Clone)]
pub struct FadeEnvelope {
    curve: FadeCurve,
    fade_in_window: u64,
    fade_out_window: u64,
    position: u64,
}

impl FadeEnvelope {
    pub fn new(curve: FadeCurve) -> Self {
        Self {
            curve,
            ..Default::default()
        }
    }

    pub fn curve(&self) -> FadeCurve {
        self.curve
    }

    pub fn set_curve(&mut self, curve: FadeCurve) {
        self.curve = curve;
    }

    /// Arm a fade-in over `window` samples and reset the position counter
    pub fn start_fade_in(&mut self, window: u64) {
        self.fade_in_window = window;
        self.position = 0;
    }

    /// Arm a fade-out over `window` samples and reset the position counter
    pub fn start_fade_out(&mut self, window: u64) {
        self.fade_out_window = window;
        self.position = 0;
    }

    /// Disarm a pending fade-in without touching an active fade-out
    pub fn clear_fade_in(&mut self) {
        self.fade_in_window = 0;
    }

    /// True while either window is armed
    pub fn is_active(&self) -> bool {
        self.fade_in_window > 0 || self.fade_out_window > 0
    }

    fn shape(&self, scale: f32) -> f32 {
        match self.curve {
            FadeCurve::Linear => scale,
            FadeCurve::Exponential => scale * scale,
        }
    }

    /// Scale `buffer` by the envelope and advance past it
    ///
    /// Returns true when a fade-out window was consumed by this buffer.
    pub fn apply(&mut self, buffer: &mut StereoBuffer) -> bool {
        if self.fade_in_window > 0 {
            let scale = self.position as f32 / self.fade_in_window as f32;
            buffer.scale(self.shape(scale));
            self.position += buffer.len() as u64;
            if self.position >= self.fade_in_window {
                self.fade_in_window = 0;
                self.position = 0;
            }
            false
        } else if self.fade_out_window > 0 {
            let scale = 1.0 - self.position as f32 / self.fade_out_window as f32;
            buffer.scale(self.shape(scale.max(0.0)));
            self.position += buffer.len() as u64;
            if self.position >= self.fade_out_window {
                self.fade_out_window = 0;
                self.position = 0;
                return true;
            }
            false
        } else {
            false
        }
    }
}
