use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Serialize, Deserialize};

const AVATAR_CONFIG_FILE: &str = "avatar.toml";

// =============================================================================
// Avatar Configuration System
// =============================================================================

/// Autopilot (waypoint route) tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Distance at which a waypoint counts as reached
    pub waypoint_radius: f64,
    /// How long the distance may stay unchanged before the route fails
    pub stuck_timeout_ms: u64,
    /// Stuck detector period
    pub tick_interval_ms: u64,
    /// Wrap back to the first waypoint after the last one
    pub loop_route: bool,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            waypoint_radius: 2.0,
            stuck_timeout_ms: 10_000,
            tick_interval_ms: 500,
            loop_route: false,
        }
    }
}

impl NavigationSettings {
    pub fn stuck_timeout(&self) -> Duration {
        Duration::from_millis(self.stuck_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Walk-to and follow tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkSettings {
    pub poll_interval_ms: u64,
    /// Give up when the distance stays unchanged this long
    pub stall_timeout_ms: u64,
    /// Walking ends once closer than this
    pub arrival_distance: f64,
    /// Wait before measuring the final distance for the finish report
    pub settle_delay_ms: u64,
    /// Distance kept from a followed avatar
    pub follow_distance: f64,
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            stall_timeout_ms: 10_000,
            arrival_distance: 2.0,
            settle_delay_ms: 1_000,
            follow_distance: 3.0,
        }
    }
}

impl WalkSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutfitSettings {
    /// Delay between an outfit change and the appearance rebake request
    pub appearance_settle_delay_ms: u64,
    /// Name given to a newly created outfit folder
    pub folder_name: String,
}

impl Default for OutfitSettings {
    fn default() -> Self {
        Self {
            appearance_settle_delay_ms: 2_000,
            folder_name: "Current Outfit".to_string(),
        }
    }
}

impl OutfitSettings {
    pub fn appearance_settle_delay(&self) -> Duration {
        Duration::from_millis(self.appearance_settle_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarSettings {
    pub navigation: NavigationSettings,
    pub walking: WalkSettings,
    pub outfit: OutfitSettings,
}

pub type AvatarSettingsHandle = Arc<RwLock<AvatarSettings>>;

pub fn create_avatar_settings_handle(settings: AvatarSettings) -> AvatarSettingsHandle {
    Arc::new(RwLock::new(settings))
}

// Avatar configuration file management
fn avatar_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "slv", "slv-avatar")
        .map(|proj| proj.config_dir().join(AVATAR_CONFIG_FILE))
}

pub fn save_avatar_settings(settings: &AvatarSettings) -> io::Result<()> {
    match avatar_config_path() {
        Some(path) => save_avatar_settings_to(&path, settings),
        None => Ok(()),
    }
}

pub fn load_avatar_settings() -> Option<AvatarSettings> {
    avatar_config_path().and_then(|path| load_avatar_settings_from(&path))
}

pub fn save_avatar_settings_to(path: &Path, settings: &AvatarSettings) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let toml = toml::to_string_pretty(settings)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, toml)
}

pub fn load_avatar_settings_from(path: &Path) -> Option<AvatarSettings> {
    let data = fs::read_to_string(path).ok()?;
    match toml::from_str::<AvatarSettings>(&data) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!("Ignoring malformed settings file {}: {}", path.display(), e);
            None
        }
    }
}
