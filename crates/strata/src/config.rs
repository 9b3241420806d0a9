//! Configuration file handling for strata.
//!
//! Looks for `.config/strata.toml` in the current directory or any parent directory.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Migration settings.
///
/// Every key is optional:
///
/// ```toml
/// allow_drops = false
/// schema = "public"
/// transactional = true
/// database_url = "postgres://localhost/app"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Execute DROP, ALTER_DROP_COLUMN, ALTER_DROP_KEY and DROP_INDEX actions.
    pub allow_drops: bool,
    /// Catalog schema to introspect.
    pub schema: String,
    /// Apply the whole plan in one transaction when the provider can.
    pub transactional: bool,
    /// Connection string, overridden by `DATABASE_URL`.
    pub database_url: Option<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            allow_drops: false,
            schema: "public".to_owned(),
            transactional: true,
            database_url: None,
        }
    }
}

impl MigrationConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Connection string: `DATABASE_URL` first, then the file.
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database_url.clone())
    }
}

/// Load configuration from `.config/strata.toml`, searching up the directory tree.
pub fn load() -> Result<(MigrationConfig, Utf8PathBuf), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| ConfigError::Io(e.to_string()))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Utf8Path) -> Result<(MigrationConfig, Utf8PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;
    let config = MigrationConfig::from_toml(&content)?;
    tracing::debug!(path = %config_path, "loaded migration config");
    Ok((config, config_path))
}

fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".config/strata.toml");
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// No `.config/strata.toml` found in any parent directory
    NotFound,
    /// I/O error reading the file
    Io(String),
    /// Invalid TOML or unknown keys
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound => {
                write!(
                    f,
                    "No .config/strata.toml found in current directory or any parent"
                )
            }
            ConfigError::Io(e) => write!(f, "Failed to read .config/strata.toml: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse .config/strata.toml: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> Utf8PathBuf {
        let dir = std::env::temp_dir().join(format!("strata-config-{}-{}", name, std::process::id()));
        let dir = Utf8PathBuf::try_from(dir).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = MigrationConfig::from_toml("").unwrap();
        assert_eq!(config, MigrationConfig::default());
        assert!(!config.allow_drops);
        assert!(config.transactional);
        assert_eq!(config.schema, "public");
    }

    #[test]
    fn test_partial_document() {
        let config = MigrationConfig::from_toml("allow_drops = true\nschema = \"app\"\n").unwrap();
        assert!(config.allow_drops);
        assert_eq!(config.schema, "app");
        assert!(config.transactional);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = MigrationConfig::from_toml("allow_drop = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_searches_parents() {
        let root = scratch_dir("parents");
        std::fs::create_dir_all(root.join(".config")).unwrap();
        std::fs::write(root.join(".config/strata.toml"), "transactional = false\n").unwrap();
        let nested = root.join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = load_from(&nested).unwrap();
        assert!(!config.transactional);
        assert_eq!(path, root.join(".config/strata.toml"));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
