use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::colors::ThemeMode;
use crate::furnace::{FurnaceSettings, DEFAULT_SHEET_LENGTH_MM, FURNACE_LENGTH_MM};
use crate::journal::DEDUP_WINDOW_MS;
use crate::scheduler::TICK_PERIOD;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub furnace: FurnaceConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub keybindings: KeyBindings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FurnaceConfig {
    /// Usable furnace length, used to derive how many sheets fit
    #[serde(default = "default_furnace_length")]
    pub length_mm: u32,

    /// Sheet length a new or reset furnace starts with
    #[serde(default = "default_sheet_length")]
    pub default_sheet_length_mm: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Identical consecutive entries closer than this are dropped
    #[serde(default = "default_dedup_window")]
    pub dedup_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory for saved furnace state; `~/.furnace-control/storage` if unset
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Operator whose state is loaded and saved; nothing is persisted without one
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    /// Password required to clear a journal; clearing is disabled when empty
    #[serde(default)]
    pub secret: String,
}

/// Status and chrome colors as `#RRGGBB`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// Mode used until the operator toggles it from the dashboard
    pub mode: ThemeMode,
    pub inactive: String,
    pub active: String,
    pub downtime: String,
    pub accent: String,
    pub light_text: String,
    pub light_background: String,
    pub dark_text: String,
    pub dark_background: String,
}

/// Dashboard key combinations such as `"s"` or `"Ctrl+X"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub quit: String,
    pub next_furnace: String,
    pub prev_furnace: String,
    pub next_field: String,
    pub prev_field: String,
    pub edit_field: String,
    pub start_process: String,
    pub start_downtime: String,
    pub end_downtime: String,
    pub reset: String,
    pub clear_journal: String,
    pub toggle_report: String,
    pub toggle_theme: String,
    pub switch_user: String,
}

// Default value functions
fn default_furnace_length() -> u32 {
    FURNACE_LENGTH_MM
}

fn default_sheet_length() -> u32 {
    DEFAULT_SHEET_LENGTH_MM
}

fn default_dedup_window() -> u64 {
    DEDUP_WINDOW_MS.unsigned_abs()
}

fn default_tick_interval() -> u64 {
    u64::try_from(TICK_PERIOD.as_millis()).unwrap_or(1000)
}

impl Default for FurnaceConfig {
    fn default() -> Self {
        Self {
            length_mm: FURNACE_LENGTH_MM,
            default_sheet_length_mm: DEFAULT_SHEET_LENGTH_MM,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: default_dedup_window(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            inactive: "#888888".to_string(),
            active: "#4CAF50".to_string(),
            downtime: "#F44336".to_string(),
            mode: ThemeMode::Light,
            accent: "#DD6666".to_string(),
            light_text: "#333333".to_string(),
            light_background: "#F5F5F5".to_string(),
            dark_text: "#C0B0B0".to_string(),
            dark_background: "#1E1E1E".to_string(),
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            quit: "q".to_string(),
            next_furnace: "Right".to_string(),
            prev_furnace: "Left".to_string(),
            next_field: "Down".to_string(),
            prev_field: "Up".to_string(),
            edit_field: "Enter".to_string(),
            start_process: "s".to_string(),
            start_downtime: "d".to_string(),
            end_downtime: "e".to_string(),
            reset: "r".to_string(),
            clear_journal: "Ctrl+X".to_string(),
            toggle_report: "p".to_string(),
            toggle_theme: "t".to_string(),
            switch_user: "u".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from default location
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self).context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get default configuration path
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.yaml"))
    }

    /// `~/.furnace-control`
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".furnace-control"))
    }

    /// Settings handed to the furnace store
    #[must_use]
    pub fn furnace_settings(&self) -> FurnaceSettings {
        FurnaceSettings {
            furnace_length_mm: self.furnace.length_mm,
            default_sheet_length_mm: self.furnace.default_sheet_length_mm,
            dedup_window_ms: i64::try_from(self.journal.dedup_window_ms).unwrap_or(i64::MAX),
        }
    }

    /// Tick period, never shorter than 100 ms
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.timer.tick_interval_ms.max(100))
    }
}
