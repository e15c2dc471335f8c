//! Reverb algorithms
//!
//! Several independent designs sharing the [`Effect`](crate::effect::Effect)
//! contract, ordered roughly by cost: a single-tap feedback line
//! ([`UltraLightReverb`]), a compact comb/allpass network ([`LiteReverb`]),
//! a modulated four-line feedback delay network ([`FdnReverb`]), an
//! early/late split design ([`HallReverb`]), a tap-plus-comb plate
//! ([`PlateReverb`]), and direct convolution against a measured impulse
//! response ([`ConvolutionReverb`]).

mod convolution;
mod fdn;
mod hall;
mod lite;
mod plate;
mod ultra_light;

pub use convolution::ConvolutionReverb;
pub use fdn::FdnReverb;
pub use hall::HallReverb;
pub use lite::LiteReverb;
pub use plate::PlateReverb;
pub use ultra_light::UltraLightReverb;
