//! Offline sample-rate conversion for decoded buffers

use impulse_core::AudioBuffer;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

const SINC_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("Invalid sample rates {from} -> {to}")]
    InvalidRate { from: f64, to: f64 },
    #[error("Resampler init error: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),
    #[error("Resample error: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Convert `buffer` from `from_rate` to `to_rate`.
///
/// Returns a copy when the rates already match. The resampler's group delay
/// is compensated, so sample 0 of the output lines up with sample 0 of the
/// input, and the output is exactly `round(frames * to_rate / from_rate)`
/// frames long.
pub fn resample(buffer: &AudioBuffer, from_rate: f64, to_rate: f64) -> Result<AudioBuffer, ResampleError> {
    if (from_rate - to_rate).abs() < f64::EPSILON || buffer.is_empty() {
        return Ok(buffer.clone());
    }
    if from_rate <= 0.0 || to_rate <= 0.0 {
        return Err(ResampleError::InvalidRate { from: from_rate, to: to_rate });
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate / from_rate;
    let frames = buffer.num_samples();

    let padded_len = frames + SINC_LEN;
    let input: Vec<Vec<f32>> = buffer
        .channels()
        .iter()
        .map(|channel| {
            let mut padded = Vec::with_capacity(padded_len);
            padded.extend_from_slice(channel);
            padded.resize(padded_len, 0.0);
            padded
        })
        .collect();

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, padded_len, buffer.num_channels())?;

    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).round() as usize;
    let wanted = delay + expected;

    let mut output = resampler.process(&input, None)?;

    // The delayed tail is still inside the filter: flush it with silence
    while output.first().map_or(0, Vec::len) < wanted {
        let tail = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        if tail.first().is_none_or(Vec::is_empty) {
            break;
        }
        for (channel, more) in output.iter_mut().zip(tail) {
            channel.extend(more);
        }
    }

    let channels = output
        .into_iter()
        .map(|channel| channel.into_iter().skip(delay).take(expected).collect())
        .collect();

    Ok(AudioBuffer::from_channels(channels))
}
