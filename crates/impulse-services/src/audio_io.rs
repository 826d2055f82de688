//! Real-time audio output over the default device

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Rate and channel count an output stream runs at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

fn default_device() -> Result<cpal::Device, AudioOutputError> {
    cpal::default_host()
        .default_output_device()
        .ok_or(AudioOutputError::NoDevices)
}

/// Real-time audio output stream driven by a render callback
pub struct RealtimeOutputStream {
    stop_flag: Arc<AtomicBool>,
    format: OutputFormat,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    /// Format of the default output device
    pub fn default_format() -> Result<OutputFormat, AudioOutputError> {
        let config = default_device()?
            .default_output_config()
            .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;
        Ok(OutputFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        })
    }

    /// Start an f32 stream at `format` that fills interleaved buffers from `render`
    pub fn start<F>(format: OutputFormat, mut render: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let device = default_device()?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if stop_clone.load(Ordering::SeqCst) {
                        data.fill(0.0);
                        return;
                    }
                    render(data);
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        stream.play().map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Started realtime output stream"
        );

        Ok(Self { stop_flag, format, _stream: stream })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Output silence from now on
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}
