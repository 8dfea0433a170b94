//! Preference persistence.
//!
//! Preferences are stored under the same keys the web client used
//! (`calculationMethod`, `timeZone`, ...) so an exported browser profile can
//! be dropped in as-is. That legacy layout has no version key and is treated
//! as version 0.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::messages::Language;
use crate::prayer::CalculationMethod;
use crate::reminder::PrayerReminders;
use crate::traits::PermissionState;

pub const KEY_SCHEMA_VERSION: &str = "schemaVersion";
pub const KEY_CALCULATION_METHOD: &str = "calculationMethod";
pub const KEY_TIME_ZONE: &str = "timeZone";
pub const KEY_LANGUAGE: &str = "language";
pub const KEY_PRAYER_REMINDERS: &str = "prayerReminders";
pub const KEY_NOTIFICATION_PERMISSION: &str = "notificationPermission";
pub const KEY_THEME: &str = "theme";

// ==================== Key-Value Port ====================

/// Flat key-value storage of JSON values.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Read and deserialize one key.
pub fn read_value<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize and write one key.
pub fn write_value<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value)
}

/// In-memory store, used in tests and when no preferences path is set.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// A single JSON object on disk.
///
/// Every write replaces the whole file via a sibling temp file and a rename,
/// so a crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the document at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
                    key: path.display().to_string(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened preference store at {}", path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| {
            StoreError::Serialization {
                key: self.path.display().to_string(),
                source,
            }
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, Value>)) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut entries);
        self.persist(&entries)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

// ==================== Preferences ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// User choices that survive restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub calculation_method: CalculationMethod,
    pub timezone: Tz,
    pub language: Language,
    pub prayer_reminders: PrayerReminders,
    pub notification_permission: PermissionState,
    pub theme: Theme,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            calculation_method: CalculationMethod::UmmAlQura,
            timezone: chrono_tz::UTC,
            language: Language::En,
            prayer_reminders: PrayerReminders::default(),
            notification_permission: PermissionState::Default,
            theme: Theme::Light,
        }
    }
}

impl Preferences {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Load preferences, falling back to `defaults` for missing keys.
    ///
    /// Unversioned data is upgraded in place. Data written by a newer
    /// version is refused rather than misread.
    pub fn load(store: &dyn KeyValueStore, defaults: Preferences) -> Result<Self, StoreError> {
        let version: Option<u32> = read_value(store, KEY_SCHEMA_VERSION)?;

        match version {
            Some(v) if v > Self::CURRENT_VERSION => Err(StoreError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: v,
            }),
            Some(_) => Ok(Self {
                calculation_method: read_value(store, KEY_CALCULATION_METHOD)?
                    .unwrap_or(defaults.calculation_method),
                timezone: read_value(store, KEY_TIME_ZONE)?.unwrap_or(defaults.timezone),
                language: read_value(store, KEY_LANGUAGE)?.unwrap_or(defaults.language),
                prayer_reminders: read_value(store, KEY_PRAYER_REMINDERS)?
                    .unwrap_or(defaults.prayer_reminders),
                notification_permission: read_value(store, KEY_NOTIFICATION_PERMISSION)?
                    .unwrap_or(defaults.notification_permission),
                theme: read_value(store, KEY_THEME)?.unwrap_or(defaults.theme),
            }),
            None => Self::upgrade_legacy(store, defaults),
        }
    }

    /// Read the unversioned layout, where any value may be malformed, then
    /// rewrite it as the current version.
    fn upgrade_legacy(store: &dyn KeyValueStore, defaults: Preferences) -> Result<Self, StoreError> {
        fn lenient<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, default: T) -> T {
            match read_value(store, key) {
                Ok(Some(v)) => v,
                Ok(None) => default,
                Err(e) => {
                    tracing::warn!("Discarding unreadable legacy preference: {}", e);
                    default
                }
            }
        }

        let prefs = Self {
            calculation_method: lenient(store, KEY_CALCULATION_METHOD, defaults.calculation_method),
            timezone: lenient(store, KEY_TIME_ZONE, defaults.timezone),
            language: lenient(store, KEY_LANGUAGE, defaults.language),
            prayer_reminders: lenient(store, KEY_PRAYER_REMINDERS, defaults.prayer_reminders),
            notification_permission: lenient(
                store,
                KEY_NOTIFICATION_PERMISSION,
                defaults.notification_permission,
            ),
            theme: lenient(store, KEY_THEME, defaults.theme),
        };

        tracing::info!("Upgrading preferences to v{}", Self::CURRENT_VERSION);
        prefs.save(store)?;
        Ok(prefs)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        write_value(store, KEY_CALCULATION_METHOD, &self.calculation_method)?;
        write_value(store, KEY_TIME_ZONE, &self.timezone)?;
        write_value(store, KEY_LANGUAGE, &self.language)?;
        write_value(store, KEY_PRAYER_REMINDERS, &self.prayer_reminders)?;
        write_value(store, KEY_NOTIFICATION_PERMISSION, &self.notification_permission)?;
        write_value(store, KEY_THEME, &self.theme)?;
        write_value(store, KEY_SCHEMA_VERSION, &Self::CURRENT_VERSION)
    }
}
