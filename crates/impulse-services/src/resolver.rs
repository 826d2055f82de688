//! Maps a position selection to a decoded impulse response

use impulse_core::{BufferWithSampleRate, ImpulseError, Position, Result};
use tracing::debug;

use crate::assets::AssetLocator;
use crate::wav_reader;

/// Loads the impulse response bound to a `Position`
#[derive(Debug, Clone)]
pub struct ImpulseResolver {
    locator: AssetLocator,
}

impl ImpulseResolver {
    pub fn new(locator: AssetLocator) -> Self {
        Self { locator }
    }

    /// Decode the IR for `position`. `Ok(None)` for bypass.
    pub fn resolve(&self, position: Position) -> Result<Option<BufferWithSampleRate>> {
        let Some(asset_name) = position.asset_name() else {
            return Ok(None);
        };

        let stream = self.locator.open(asset_name)?;
        let decoded = wav_reader::decode_wav(stream)?;
        if decoded.buffer.is_empty() {
            return Err(ImpulseError::EmptyImpulse);
        }

        debug!(
            asset = asset_name,
            channels = decoded.buffer.num_channels(),
            samples = decoded.buffer.num_samples(),
            sample_rate = decoded.sample_rate,
            "Decoded impulse response"
        );
        Ok(Some(decoded))
    }
}
