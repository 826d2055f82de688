use std::path::{Path, PathBuf};

use impulse_core::Position;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, Default)]
pub(super) struct AppConfig {
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub effect: EffectConfig,
}

/// Extra directories searched for impulse responses, before the bundled `Assets`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, Default)]
pub(super) struct AssetsConfig {
    #[serde(default)]
    pub dirs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub(super) struct AudioConfig {
    /// Largest block handed to the effect
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { block_size: 512 }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub(super) struct PlayerConfig {
    /// Played when no file was open last time
    pub default_file: Option<String>,
    pub looping: bool,
    pub last_file: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { default_file: None, looping: true, last_file: None }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, Default)]
#[serde(default)]
pub(super) struct EffectConfig {
    pub position: Position,
}

impl AppConfig {
    /// File to open on start-up
    pub fn startup_file(&self) -> Option<PathBuf> {
        self.player
            .last_file
            .as_ref()
            .or(self.player.default_file.as_ref())
            .map(PathBuf::from)
    }
}

pub(super) fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("impulse")
        .join("config.toml")
}

pub(super) fn load_config() -> AppConfig {
    load_config_from(&config_path())
}

pub(super) fn save_config(config: &AppConfig) {
    save_config_to(&config_path(), config);
}

fn load_config_from(path: &Path) -> AppConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str(&s).ok())
        .unwrap_or_default()
}

fn save_config_to(path: &Path, config: &AppConfig) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(s) = toml::to_string_pretty(config) else { return };
    if let Err(e) = std::fs::write(path, s) {
        tracing::warn!("Failed to save config to {}: {}", path.display(), e);
    }
}
