//! WAV decoding into multichannel f32 buffers

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use impulse_core::{AudioBuffer, BufferWithSampleRate, ImpulseError, Result};

/// Decode a WAV byte stream at its native rate and channel count.
///
/// Integer PCM of any bit depth up to 32 and 32-bit float are supported.
pub fn decode_wav<R: Read>(reader: R) -> Result<BufferWithSampleRate> {
    let reader = WavReader::new(reader).map_err(|e| ImpulseError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    if channels == 0 {
        return Err(ImpulseError::Decode("no channels".into()));
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ImpulseError::Decode(e.to_string()))?,
        (SampleFormat::Int, bits @ 1..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ImpulseError::Decode(e.to_string()))?
        }
        (format, bits) => {
            return Err(ImpulseError::Decode(format!("unsupported format {format:?} {bits}-bit")));
        }
    };

    let buffer = AudioBuffer::from_interleaved(&interleaved, channels);
    if buffer.is_empty() {
        return Err(ImpulseError::Decode("no data chunk".into()));
    }

    Ok(BufferWithSampleRate::new(buffer, spec.sample_rate as f64))
}

/// Decode a WAV file from disk
pub fn read_wav(path: &Path) -> Result<BufferWithSampleRate> {
    let file = File::open(path)?;
    decode_wav(BufReader::new(file))
}
