use serde::{Deserialize, Serialize};

/// Reverb settings, all in the 0..1 range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParameters {
    pub room_size: f32,
    pub damping: f32,
    pub wet_level: f32,
    pub dry_level: f32,
    pub width: f32,
    /// Values >= 0.5 hold the current tail indefinitely
    pub freeze_mode: f32,
}

impl ReverbParameters {
    /// Small, heavily damped room mixed in under a full dry signal
    pub const CONVOLUTION_DEMO: Self = Self {
        room_size: 0.12,
        damping: 0.8,
        wet_level: 0.02,
        dry_level: 1.0,
        width: 1.0,
        freeze_mode: 0.0,
    };

    pub fn is_frozen(&self) -> bool {
        self.freeze_mode >= 0.5
    }
}

impl Default for ReverbParameters {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet_level: 0.33,
            dry_level: 0.4,
            width: 1.0,
            freeze_mode: 0.0,
        }
    }
}
