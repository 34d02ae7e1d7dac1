use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::preferences::PREFERENCES_FILE;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowlogConfig {
    pub database: Option<String>,
    pub preferences: Option<String>,
}

impl FlowlogConfig {
    /// Database path: explicit override, then config, then the per-user default
    pub fn database_path(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.database.as_ref().map(PathBuf::from))
            .unwrap_or_else(default_database_path)
    }

    /// Preferences path: config, else next to the database
    pub fn preferences_path(&self, database: &Path) -> PathBuf {
        match &self.preferences {
            Some(path) => PathBuf::from(path),
            None => database
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(PREFERENCES_FILE),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("flowlog.toml")
}

pub fn default_database_path() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    default_database_path_in(&base)
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join("flowlog").join("flowlog.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<FlowlogConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: FlowlogConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &FlowlogConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flowlog.toml");
        let config = FlowlogConfig {
            database: Some("journal.db".into()),
            preferences: None,
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.database.as_deref(), Some("journal.db"));
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_path_precedence() {
        let config = FlowlogConfig {
            database: Some("/tmp/from-config.db".into()),
            preferences: None,
        };
        assert_eq!(
            config.database_path(Some(Path::new("/tmp/cli.db"))),
            PathBuf::from("/tmp/cli.db")
        );
        assert_eq!(config.database_path(None), PathBuf::from("/tmp/from-config.db"));
        assert_eq!(
            config.preferences_path(Path::new("/tmp/x/flowlog.db")),
            PathBuf::from("/tmp/x/preferences.toml")
        );
        assert!(FlowlogConfig::default().database_path(None).ends_with("flowlog/flowlog.db"));
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("a").join("b").join("flowlog.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }
}
