//! # Runtime Configuration
//!
//! Settings for the HTTP adapter and the coroutine runtime.
//!
//! Values are resolved in three layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional YAML file
//! 3. environment variables
//!
//! | Variable | YAML key | Default |
//! |---|---|---|
//! | `METAROUTE_BIND` | `bind` | `127.0.0.1:8080` |
//! | `METAROUTE_STACK_SIZE` | `stack_size` | `0x4000` |
//! | `METAROUTE_DOCS_PATH` | `docs_path` | `/api.json` |
//! | `METAROUTE_MAX_BODY_BYTES` | `max_body_bytes` | `1048576` |
//!
//! Sizes accept decimal or `0x` hexadecimal.
//!
//! ```yaml
//! bind: 0.0.0.0:9000
//! stack_size: 0x8000
//! ```

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_STACK_SIZE: usize = 0x4000;
pub const DEFAULT_DOCS_PATH: &str = "/api.json";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    /// A setting was present but could not be used
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read config file {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config file {}: {source}", path.display())
            }
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "invalid {key} `{value}`: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Listen address of the HTTP adapter
    pub bind: String,
    /// Coroutine stack size in bytes
    pub stack_size: usize,
    /// Path serving the generated API document
    pub docs_path: String,
    /// Larger request bodies are rejected before dispatch
    pub max_body_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            stack_size: DEFAULT_STACK_SIZE,
            docs_path: DEFAULT_DOCS_PATH.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Partial settings as written in a YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    bind: Option<String>,
    stack_size: Option<SizeValue>,
    docs_path: Option<String>,
    max_body_bytes: Option<SizeValue>,
}

/// YAML reads `0x4000` as a string and `16384` as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Number(usize),
    Text(String),
}

impl RuntimeConfig {
    /// Defaults overlaid with the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_lookup(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.apply_file(path)?;
        }
        config.apply_lookup(|key| env::var(key).ok())?;
        info!(
            bind = %config.bind,
            stack_size = config.stack_size,
            docs_path = %config.docs_path,
            max_body_bytes = config.max_body_bytes,
            config_file = ?path,
            "Runtime configuration loaded"
        );
        Ok(config)
    }

    /// Overlay the settings present in a YAML file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(bind) = file.bind {
            self.bind = bind;
        }
        if let Some(size) = file.stack_size {
            self.stack_size = size.resolve("stack_size")?;
        }
        if let Some(docs_path) = file.docs_path {
            self.docs_path = docs_path;
        }
        if let Some(size) = file.max_body_bytes {
            self.max_body_bytes = size.resolve("max_body_bytes")?;
        }
        self.check()
    }

    /// Overlay `METAROUTE_*` values from any key lookup.
    pub fn apply_lookup(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(bind) = lookup("METAROUTE_BIND") {
            self.bind = bind;
        }
        if let Some(size) = lookup("METAROUTE_STACK_SIZE") {
            self.stack_size = parse_size("METAROUTE_STACK_SIZE", &size)?;
        }
        if let Some(docs_path) = lookup("METAROUTE_DOCS_PATH") {
            self.docs_path = docs_path;
        }
        if let Some(size) = lookup("METAROUTE_MAX_BODY_BYTES") {
            self.max_body_bytes = parse_size("METAROUTE_MAX_BODY_BYTES", &size)?;
        }
        self.check()
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "bind",
                value: self.bind.clone(),
                reason: "must not be empty",
            });
        }
        if !self.docs_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "docs_path",
                value: self.docs_path.clone(),
                reason: "must start with `/`",
            });
        }
        if self.stack_size == 0 {
            return Err(ConfigError::Invalid {
                key: "stack_size",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl SizeValue {
    fn resolve(self, key: &'static str) -> Result<usize, ConfigError> {
        match self {
            SizeValue::Number(n) => Ok(n),
            SizeValue::Text(s) => parse_size(key, &s),
        }
    }
}

/// Decimal or `0x`-prefixed hexadecimal byte count.
fn parse_size(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let trimmed = raw.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: "expected a decimal or 0x-prefixed hexadecimal size",
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.stack_size, 0x4000);
        assert_eq!(config.docs_path, "/api.json");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RuntimeConfig::default();
        config
            .apply_lookup(lookup(&[
                ("METAROUTE_BIND", "0.0.0.0:9000"),
                ("METAROUTE_STACK_SIZE", "0x8000"),
                ("METAROUTE_MAX_BODY_BYTES", "2048"),
            ]))
            .unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.stack_size, 0x8000);
        assert_eq!(config.max_body_bytes, 2048);
    }

    #[test]
    fn test_bad_size_is_an_error() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_lookup(lookup(&[("METAROUTE_STACK_SIZE", "big")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "METAROUTE_STACK_SIZE", .. }));
    }

    #[test]
    fn test_yaml_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind: 10.0.0.1:80\nstack_size: 0x10000\ndocs_path: /openapi.json").unwrap();

        let mut config = RuntimeConfig::default();
        config.apply_file(file.path()).unwrap();
        assert_eq!(config.bind, "10.0.0.1:80");
        assert_eq!(config.stack_size, 0x10000);
        assert_eq!(config.docs_path, "/openapi.json");

        config
            .apply_lookup(lookup(&[("METAROUTE_BIND", "127.0.0.1:1")]))
            .unwrap();
        assert_eq!(config.bind, "127.0.0.1:1");
        assert_eq!(config.stack_size, 0x10000);
    }

    #[test]
    fn test_yaml_rejects_unknown_keys_and_bad_paths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "colour: blue").unwrap();
        let err = RuntimeConfig::default().apply_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "docs_path: api.json").unwrap();
        let err = RuntimeConfig::default().apply_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "docs_path", .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = RuntimeConfig::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
