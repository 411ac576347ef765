use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Persisted playback settings for [`crate::GifPlayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Delay used for frames whose GIF delay is 0.
    #[serde(default = "default_min_frame_interval")]
    pub min_frame_interval_ms: u32,
    #[serde(default = "default_queue_capacity")]
    pub command_queue_capacity: usize,
    /// Collapse consecutive queued seeks into the last one.
    #[serde(default = "default_true")]
    pub coalesce_seeks: bool,
    #[serde(default = "default_speed")]
    pub default_speed: f32,
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_version() -> u32 { 1 }
fn default_min_frame_interval() -> u32 { 20 }
fn default_queue_capacity() -> usize { 64 }
fn default_true() -> bool { true }
fn default_speed() -> f32 { 1.0 }
fn default_thread_name() -> String { "gif-player".to_string() }

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            min_frame_interval_ms: 20,
            command_queue_capacity: 64,
            coalesce_seeks: true,
            default_speed: 1.0,
            thread_name: "gif-player".to_string(),
        }
    }
}

impl PlayerConfig {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("gif-engine").join("player.json")
    }

    /// Load from the user config directory, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    log::info!("Loaded player config from {}", path.display());
                    config.sanitized()
                }
                Err(e) => {
                    log::warn!("Failed to parse player config: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No player config found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        log::debug!("Saved player config to {}", path.display());
        Ok(())
    }

    /// Replace out-of-range values with their defaults.
    fn sanitized(mut self) -> Self {
        if !self.default_speed.is_finite() || self.default_speed <= 0.0 {
            log::warn!(
                "Ignoring invalid default speed {}, using 1.0",
                self.default_speed
            );
            self.default_speed = default_speed();
        }
        if self.command_queue_capacity == 0 {
            self.command_queue_capacity = default_queue_capacity();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_config_defaults() {
        let c = PlayerConfig::default();
        assert_eq!(c.min_frame_interval_ms, 20);
        assert_eq!(c.command_queue_capacity, 64);
        assert!(c.coalesce_seeks);
        assert_eq!(c.default_speed, 1.0);
        assert_eq!(c.thread_name, "gif-player");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let c: PlayerConfig = serde_json::from_str(r#"{"coalesce_seeks": false}"#).unwrap();
        assert!(!c.coalesce_seeks);
        assert_eq!(c.min_frame_interval_ms, 20);
        assert_eq!(c.version, 1);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("player.json");
        let c = PlayerConfig {
            min_frame_interval_ms: 16,
            default_speed: 1.5,
            ..PlayerConfig::default()
        };
        c.save_to(&path).unwrap();
        assert_eq!(PlayerConfig::load_from(&path), c);
    }

    #[test]
    fn unreadable_or_invalid_files_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            PlayerConfig::load_from(&dir.path().join("absent.json")),
            PlayerConfig::default()
        );

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(PlayerConfig::load_from(&path), PlayerConfig::default());

        std::fs::write(&path, r#"{"default_speed": -2.0, "command_queue_capacity": 0}"#).unwrap();
        let c = PlayerConfig::load_from(&path);
        assert_eq!(c.default_speed, 1.0);
        assert_eq!(c.command_queue_capacity, 64);
    }
}
