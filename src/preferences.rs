//! Persisted user preferences (the active axis)

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Result;

/// File name used next to the database
pub const PREFERENCES_FILE: &str = "preferences.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Name of the axis the store opens on
    pub active_axis: Option<String>,
}

/// Where preferences are loaded from and saved to
pub trait PreferencesStore: Send {
    /// Stored preferences, or `None` if there are none (or they are unreadable)
    fn load(&self) -> Option<Preferences>;

    fn save(&self, preferences: &Preferences) -> Result<()>;
}

/// TOML file backed preferences
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `preferences.toml` in the database's directory
    pub fn beside(database: &Path) -> Self {
        let dir = database.parent().unwrap_or_else(|| Path::new(""));
        Self::new(dir.join(PREFERENCES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferencesStore for FilePreferences {
    fn load(&self) -> Option<Preferences> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match toml::from_str(&contents) {
            Ok(preferences) => Some(preferences),
            Err(e) => {
                tracing::warn!("Ignoring unreadable preferences {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        let contents = toml::to_string_pretty(preferences)
            .map_err(|e| crate::Error::Unspecified(Box::new(e)))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// In-memory preferences, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    value: Mutex<Option<Preferences>>,
}

impl MemoryPreferences {
    pub fn new(initial: Option<Preferences>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }
}

impl PreferencesStore for MemoryPreferences {
    fn load(&self) -> Option<Preferences> {
        self.value.lock().clone()
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        *self.value.lock() = Some(preferences.clone());
        Ok(())
    }
}
