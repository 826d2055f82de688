//! Processing stages and the host-facing processor trait

pub mod convolution;
pub mod reverb;

pub use convolution::{Convolution, ConvolutionError};
pub use reverb::Reverb;

use impulse_core::{AudioBuffer, ProcessSpec};

/// Block processor driven by an audio host
pub trait AudioProcessor: Send {
    /// Allocate state for `spec`. Called before the first `process` and on every format change.
    fn prepare(&mut self, spec: &ProcessSpec);
    /// Process one block in place (audio thread)
    fn process(&mut self, block: &mut AudioBuffer);
    /// Clear tails without changing the format
    fn reset(&mut self);
}
