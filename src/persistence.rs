use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::auth::IdentityProvider;
use crate::furnace::{heating, FurnaceId, FurnaceRecord, FurnaceTable};

/// Storage keys are `furnaceData_<user>`
pub const STORAGE_KEY_PREFIX: &str = "furnaceData_";

/// Dashboard preferences, shared by every user of the workstation
pub const SELECTED_TAB_KEY: &str = "selectedTab";
pub const THEME_KEY: &str = "theme";

/// String key-value storage
pub trait KeyValueStore {
    /// Value under `key`, `None` if absent
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    /// Returns an error if the value cannot be written
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error
    ///
    /// # Errors
    /// Returns an error if the key exists and cannot be removed
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create) a storage directory
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).context("Failed to create storage directory")?;
        Ok(Self { dir })
    }

    /// Storage under `~/.furnace-control/storage`
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined or the
    /// directory cannot be created
    pub fn in_home() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Self::new(home.join(".furnace-control").join("storage"))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl Default for FileStore {
    /// Falls back to the system temporary directory if the home directory
    /// cannot be used.
    fn default() -> Self {
        if let Ok(store) = Self::in_home() {
            store
        } else {
            Self::fallback(std::env::temp_dir().join("furnace_control_storage"))
        }
    }
}

impl FileStore {
    /// Use `dir` even if it cannot be created; the failure is logged and
    /// later writes report their own errors
    fn fallback(dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(
                "Failed to create fallback storage directory {}: {}; saving will fail",
                dir.display(),
                e
            );
        }
        Self { dir }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read storage file"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.path_for(key), value).context("Failed to write storage file")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to delete storage file"),
        }
    }
}

/// In-memory storage; clones share contents
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Persisted form of one furnace: the record plus the time left at save time
///
/// `heatingTimeLeft` is informational only; restores always recompute it from
/// the stored timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedFurnace {
    #[serde(flatten)]
    record: FurnaceRecord,
    #[serde(default)]
    heating_time_left: u32,
}

/// Storage key for a user
#[must_use]
pub fn storage_key(user: &str) -> String {
    format!("{STORAGE_KEY_PREFIX}{user}")
}

/// Saves and restores the furnace table of the signed-in user
pub struct Persistence {
    kv: Box<dyn KeyValueStore>,
    identity: Box<dyn IdentityProvider>,
}

impl Persistence {
    #[must_use]
    pub fn new(kv: Box<dyn KeyValueStore>, identity: Box<dyn IdentityProvider>) -> Self {
        Self { kv, identity }
    }

    /// Key for the current user; `None` disables persistence
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.identity.current_user().map(|user| storage_key(&user))
    }

    #[must_use]
    pub fn current_user(&self) -> Option<String> {
        self.identity.current_user()
    }

    /// Write the whole table under the user's key
    ///
    /// Returns `Ok(false)` when nobody is signed in.
    ///
    /// # Errors
    /// Returns an error if serialization or the storage write fails
    pub fn save(&self, records: &FurnaceTable, now_ms: i64) -> Result<bool> {
        let Some(key) = self.key() else {
            return Ok(false);
        };

        let saved: BTreeMap<FurnaceId, SavedFurnace> = records
            .iter()
            .map(|(id, record)| {
                (
                    id,
                    SavedFurnace {
                        heating_time_left: heating::time_left(record, now_ms),
                        record: record.clone(),
                    },
                )
            })
            .collect();

        let json = serde_json::to_string(&saved).context("Failed to serialize furnace state")?;
        self.kv.set(&key, &json)?;
        debug!("Saved furnace state under {}", key);
        Ok(true)
    }

    /// Read the saved records of the current user
    ///
    /// Missing, unreadable or malformed state is not an error: it yields an
    /// empty map and the caller keeps its defaults. A single malformed
    /// furnace only drops that furnace.
    #[must_use]
    pub fn load(&self) -> BTreeMap<FurnaceId, FurnaceRecord> {
        let mut restored = BTreeMap::new();
        let Some(key) = self.key() else {
            return restored;
        };

        let raw = match self.kv.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No saved furnace state under {}", key);
                return restored;
            }
            Err(e) => {
                warn!("Could not read saved furnace state: {:#}", e);
                return restored;
            }
        };

        let data: HashMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(e) => {
                warn!("Ignoring malformed furnace state under {}: {}", key, e);
                return restored;
            }
        };

        for id in FurnaceId::ALL {
            let Some(value) = data.get(id.as_str()) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            match serde_json::from_value::<SavedFurnace>(value.clone()) {
                Ok(saved) => {
                    restored.insert(id, saved.record);
                }
                Err(e) => warn!("Ignoring malformed state for furnace {}: {}", id, e),
            }
        }
        restored
    }

    /// Stored dashboard preference, `None` if unset or unreadable
    #[must_use]
    pub fn preference(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not read preference {}: {:#}", key, e);
                None
            }
        }
    }

    /// Store a dashboard preference; failures are logged
    pub fn set_preference(&self, key: &str, value: &str) {
        if let Err(e) = self.kv.set(key, value) {
            warn!("Failed to save preference {}: {:#}", key, e);
        }
    }

    /// Delete the current user's saved state
    ///
    /// # Errors
    /// Returns an error if the storage entry cannot be removed
    pub fn remove(&self) -> Result<bool> {
        let Some(key) = self.key() else {
            return Ok(false);
        };
        self.kv.remove(&key)?;
        Ok(true)
    }
}
