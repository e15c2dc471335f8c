//! Audio device output
//!
//! Lock-free bridge between the rendering side and the platform audio
//! callback. The callback only copies pre-rendered buffers to the device;
//! rendering, resampling, and effect processing all happen on the
//! producer thread ahead of it.

mod error;
mod output;

pub use error::{AudioError, AudioResult};
pub use output::{open_output_stream, output_device_names, OutputMeter, OutputStream};
