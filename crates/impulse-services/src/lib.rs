//! impulse-services: Convolution DSP, IR loading and audio playback

pub mod assets;
pub mod audio_io;
pub mod buffer_transfer;
pub mod convolution_demo;
pub mod dsp;
pub mod player;
pub mod resample;
pub mod resolver;
pub mod wav_reader;

pub use assets::AssetLocator;
pub use audio_io::{AudioOutputError, OutputFormat, RealtimeOutputStream};
pub use buffer_transfer::BufferTransfer;
pub use convolution_demo::{convolution_demo, ConvolutionDemoDsp, PositionControl};
pub use dsp::{AudioProcessor, Convolution, ConvolutionError, Reverb};
pub use player::{file_player, FilePlayer, LoadedFile, PlayerError, PlayerHandle, TransportState};
pub use resample::ResampleError;
pub use resolver::ImpulseResolver;
