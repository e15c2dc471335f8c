//! Delay-line primitives shared by the reverb algorithms
//!
//! All primitives are mono; stereo effects hold one instance per channel.

/// Circular delay buffer
///
/// `front()` reads the oldest sample (the slot the next `push` overwrites),
/// `go_back(n)` reads the sample written `n` pushes ago.
pub struct Delay {
    buffer: Vec<f32>,
    pos: usize,
}

impl Delay {
    pub fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    /// The delay length in samples
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Oldest sample in the line
    #[inline]
    pub fn front(&self) -> f32 {
        self.buffer[self.pos]
    }

    /// Write a sample and advance
    #[inline]
    pub fn push(&mut self, x: f32) {
        self.buffer[self.pos] = x;
        self.pos = (self.pos + 1) % self.buffer.len();
    }

    /// Sample written `offset` pushes ago (1 = newest)
    #[inline]
    pub fn go_back(&self, offset: usize) -> f32 {
        let len = self.buffer.len();
        self.buffer[(self.pos + len - (offset % len)) % len]
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Single fixed delay, used ahead of reverb networks
///
/// A zero-length pre-delay passes the signal through unchanged.
pub struct PreDelay {
    buffer: Vec<f32>,
    index: usize,
}

impl PreDelay {
    /// Create a pre-delay of `delay_ms` at the given sample rate
    pub fn new(sample_rate: u32, delay_ms: f32) -> Self {
        let delay_samples = (sample_rate as f32 * delay_ms / 1000.0) as usize;
        Self {
            buffer: vec![0.0; delay_samples],
            index: 0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        if self.buffer.is_empty() {
            return x;
        }
        let output = self.buffer[self.index];
        self.buffer[self.index] = x;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Multi-tap delay line with per-tap gains, summed
///
/// Simulates early reflections: one write, many weighted reads.
pub struct TapDelayLine {
    buffer: Vec<f32>,
    taps: Vec<(usize, f32)>,
    pos: usize,
}

impl TapDelayLine {
    pub fn new(tap_delays: &[usize], tap_gains: &[f32]) -> Self {
        let longest = tap_delays.iter().copied().max().unwrap_or(0);
        Self {
            buffer: vec![0.0; longest + 1],
            taps: tap_delays.iter().copied().zip(tap_gains.iter().copied()).collect(),
            pos: 0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let len = self.buffer.len();
        self.buffer[self.pos] = x;
        let mut y = 0.0;
        for &(delay, gain) in &self.taps {
            y += gain * self.buffer[(self.pos + len - delay) % len];
        }
        self.pos = (self.pos + 1) % len;
        y
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Schroeder allpass filter: one feedback coefficient, one delay line
///
/// `v = feedback * delayed + input; output = delayed - feedback * v`
pub struct AllpassFilter {
    feedback: f32,
    delay: Delay,
}

impl AllpassFilter {
    pub fn new(delay_length: usize, feedback: f32) -> Self {
        Self {
            feedback,
            delay: Delay::new(delay_length),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.delay.front();
        let v = self.feedback * delayed + input;
        let output = delayed - self.feedback * v;
        self.delay.push(v);
        output
    }

    pub fn reset(&mut self) {
        self.delay.reset();
    }
}

/// Comb filter with a one-pole damping filter in the feedback path
pub struct ModulatedCombFilter {
    buffer: Vec<f32>,
    feedback: f32,
    damp1: f32,
    damp2: f32,
    last: f32,
    index: usize,
}

impl ModulatedCombFilter {
    pub fn new(delay_length: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; delay_length.max(1)],
            feedback,
            damp1: damp,
            damp2: 1.0 - damp,
            last: 0.0,
            index: 0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        self.last = output * self.damp2 + self.last * self.damp1;
        self.buffer[self.index] = input + self.last * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.last = 0.0;
    }
}

/// One-pole lowpass: `y = alpha * x + (1 - alpha) * y_prev`
#[derive(Default, Clone, Copy)]
pub struct OnePole {
    alpha: f32,
    z: f32,
}

impl OnePole {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, z: 0.0 }
    }

    /// Coefficient for a first-order lowpass with the given cutoff
    pub fn cutoff_alpha(cutoff_hz: f32, sample_rate: u32) -> f32 {
        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
        let dt = 1.0 / sample_rate as f32;
        dt / (rc + dt)
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.alpha * x + (1.0 - self.alpha) * self.z;
        self.z = y;
        y
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha;
    }

    pub fn reset(&mut self) {
        self.z = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_roundtrip() {
        let mut delay = Delay::new(4);
        for i in 0..4 {
            delay.push(i as f32);
        }
        // Oldest is 0, newest is 3
        assert_eq!(delay.front(), 0.0);
        assert_eq!(delay.go_back(1), 3.0);
        assert_eq!(delay.go_back(4), 0.0);

        delay.push(4.0);
        assert_eq!(delay.front(), 1.0);
    }

    #[test]
    fn test_predelay_offsets_signal() {
        let mut pd = PreDelay::new(1000, 3.0); // 3 samples at 1 kHz
        assert_eq!(pd.process(1.0), 0.0);
        assert_eq!(pd.process(0.0), 0.0);
        assert_eq!(pd.process(0.0), 0.0);
        assert_eq!(pd.process(0.0), 1.0);
    }

    #[test]
    fn test_predelay_zero_is_passthrough() {
        let mut pd = PreDelay::new(44100, 0.0);
        assert_eq!(pd.process(0.5), 0.5);
    }

    #[test]
    fn test_tap_delay_line_weights() {
        let mut taps = TapDelayLine::new(&[2, 4], &[0.5, 0.25]);
        let mut out = Vec::new();
        out.push(taps.process(1.0));
        for _ in 0..5 {
            out.push(taps.process(0.0));
        }
        assert_eq!(out[0], 0.0);
        assert_eq!(out[2], 0.5); // first tap after 2 samples
        assert_eq!(out[4], 0.25); // second tap after 4 samples
    }

    #[test]
    fn test_allpass_impulse_head() {
        let mut ap = AllpassFilter::new(8, 0.5);
        // First output of an impulse is -feedback * input
        assert_eq!(ap.process(1.0), -0.5);
        for _ in 0..7 {
            assert_eq!(ap.process(0.0), 0.0);
        }
        // Delayed path arrives after the line length
        let late = ap.process(0.0);
        assert!(late > 0.0);
    }

    #[test]
    fn test_comb_decays() {
        let mut comb = ModulatedCombFilter::new(4, 0.5, 0.0);
        let mut first = 0.0;
        let mut second = 0.0;
        for i in 0..12 {
            let y = comb.process(if i == 0 { 1.0 } else { 0.0 });
            if i == 4 {
                first = y;
            }
            if i == 8 {
                second = y;
            }
        }
        assert_eq!(first, 1.0);
        assert_eq!(second, 0.5);
        assert!(second < first);
    }

    #[test]
    fn test_one_pole_converges() {
        let mut lp = OnePole::new(0.5);
        let mut y = 0.0;
        for _ in 0..32 {
            y = lp.process(1.0);
        }
        assert!((y - 1.0).abs() < 1e-4);
    }
}
