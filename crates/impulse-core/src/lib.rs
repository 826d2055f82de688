//! impulse-core: Domain types for the convolution demo

mod buffer;
mod error;
pub mod parameter;
mod process;
mod reverb;

pub use buffer::{AudioBuffer, BufferWithSampleRate};
pub use error::{ImpulseError, Result};
pub use parameter::{Choice, ChoiceParameter, Position};
pub use process::{Normalise, ProcessSpec, Stereo, Trim};
pub use reverb::ReverbParameters;
