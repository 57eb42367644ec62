// Persistent kiosk settings
//
// Key/value store behind the PersistentSettings port, plus typed accessors for
// the values the kiosk needs: the admin password digest, the kiosk mode flag
// and a per-installation id.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{log_settings_error, SettingsError};

const PASSWORD_KEY: &str = "admin_password_sha256";
const KIOSK_MODE_KEY: &str = "kiosk_mode";
const INSTANCE_ID_KEY: &str = "instance_id";

/// Key/value store that survives restarts
pub trait PersistentSettings: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;
    fn remove(&self, key: &str) -> Result<(), SettingsError>;
}

/// Settings persisted as a flat JSON object
///
/// Every write rewrites the whole file.
pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileSettings {
    /// Open the settings file, starting empty if it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = Self::read(&path)?;
        log::info!(
            "[Settings] Loaded {} values from {}",
            values.len(),
            path.display()
        );
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<BTreeMap<String, String>, SettingsError> {
        if !path.exists() {
            log::info!("[Settings] No settings file at {}, starting empty", path.display());
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadFailed {
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| SettingsError::Malformed {
            reason: e.to_string(),
        })
    }

    fn write(&self, values: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        let write_failed = |reason: String| SettingsError::WriteFailed { reason };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_failed(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(values).map_err(|e| write_failed(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| write_failed(e.to_string()))
    }

    fn update<F>(&self, change: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut values = self
            .values
            .lock()
            .map_err(|_| SettingsError::LockPoisoned)?;
        let mut next = values.clone();
        change(&mut next);
        self.write(&next)
            .inspect_err(|err| log_settings_error(err, "update"))?;
        *values = next;
        Ok(())
    }
}

impl PersistentSettings for JsonFileSettings {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let values = self
            .values
            .lock()
            .map_err(|_| SettingsError::LockPoisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Typed view over [`PersistentSettings`]
pub struct KioskSettings<S: PersistentSettings> {
    store: S,
}

impl<S: PersistentSettings> KioskSettings<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn has_password(&self) -> Result<bool, SettingsError> {
        Ok(self.store.get(PASSWORD_KEY)?.is_some())
    }

    /// Store the admin password digest. An empty password clears it.
    pub fn set_password(&self, password: &str) -> Result<(), SettingsError> {
        if password.is_empty() {
            log::info!("[Settings] Admin password cleared");
            return self.store.remove(PASSWORD_KEY);
        }
        self.store.set(PASSWORD_KEY, &password_digest(password))
    }

    /// Check `password` against the stored digest
    ///
    /// Without a stored password every attempt is accepted.
    pub fn verify_password(&self, password: &str) -> Result<bool, SettingsError> {
        match self.store.get(PASSWORD_KEY)? {
            Some(digest) => Ok(digest == password_digest(password)),
            None => Ok(true),
        }
    }

    pub fn kiosk_mode(&self) -> Result<bool, SettingsError> {
        Ok(self
            .store
            .get(KIOSK_MODE_KEY)?
            .map(|value| value == "true")
            .unwrap_or(false))
    }

    pub fn set_kiosk_mode(&self, enabled: bool) -> Result<(), SettingsError> {
        self.store
            .set(KIOSK_MODE_KEY, if enabled { "true" } else { "false" })
    }

    /// Installation id, generated and stored on first use
    pub fn instance_id(&self) -> Result<String, SettingsError> {
        if let Some(id) = self.store.get(INSTANCE_ID_KEY)? {
            return Ok(id);
        }
        let id = format!("{:016x}", rand::thread_rng().gen::<u64>());
        self.store.set(INSTANCE_ID_KEY, &id)?;
        log::info!("[Settings] Generated instance id {}", id);
        Ok(id)
    }
}
