//! Bridge configuration.
//!
//! Defaults suit an embedding host: results stay proxies, the interpreter's
//! symbols are made global for C extensions, and a collection runs when a
//! session stops. Values can come from TOML and be overridden from the
//! environment:
//!
//! - `RUPY_AUTO_CONVERT`: `1/true/yes/on` or `0/false/no/off`
//! - `RUPY_PATH`: extra module search paths, platform path-list syntax

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const AUTO_CONVERT_VAR: &str = "RUPY_AUTO_CONVERT";
pub const PATH_VAR: &str = "RUPY_PATH";

/// Errors while loading a [`BridgeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Initial auto-convert mode.
    pub auto_convert: bool,
    /// Prepended to `sys.path` on every session start.
    pub search_paths: Vec<PathBuf>,
    /// Re-open `libpython` with `RTLD_GLOBAL` before first start (Linux).
    pub global_symbols: bool,
    /// Run `gc.collect()` when a session stops.
    pub collect_on_stop: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            auto_convert: false,
            search_paths: Vec::new(),
            global_symbols: true,
            collect_on_stop: true,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_env(|var| env::var_os(var))
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(AUTO_CONVERT_VAR) {
            let value = raw.to_string_lossy();
            self.auto_convert = parse_flag(&value).ok_or_else(|| ConfigError::Env {
                var: AUTO_CONVERT_VAR,
                value: value.into_owned(),
            })?;
        }
        if let Some(raw) = lookup(PATH_VAR) {
            // Env paths go first so they shadow configured ones.
            let mut paths: Vec<PathBuf> = env::split_paths(&raw)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            paths.append(&mut self.search_paths);
            self.search_paths = paths;
        }
        Ok(self)
    }

    pub fn with_auto_convert(mut self, enabled: bool) -> Self {
        self.auto_convert = enabled;
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert!(!config.auto_convert);
        assert!(config.global_symbols);
        assert!(config.collect_on_stop);
        assert!(config.search_paths.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
auto_convert = true
search_paths = ["python", "/opt/models"]
"#,
        )
        .unwrap();
        assert_eq!(
            config,
            BridgeConfig {
                auto_convert: true,
                search_paths: vec![PathBuf::from("python"), PathBuf::from("/opt/models")],
                ..BridgeConfig::default()
            }
        );
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = BridgeConfig::from_toml_str("auto_conver = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "collect_on_stop = false").unwrap();
        let config = BridgeConfig::load(file.path()).unwrap();
        assert!(!config.collect_on_stop);
    }

    #[test]
    fn test_load_missing_file() {
        let err = BridgeConfig::load("/nonexistent/rupy.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let config = BridgeConfig::default()
            .with_search_path("configured")
            .apply_env(lookup(&[(AUTO_CONVERT_VAR, "Yes"), (PATH_VAR, "first")]))
            .unwrap();
        assert!(config.auto_convert);
        assert_eq!(
            config.search_paths,
            vec![PathBuf::from("first"), PathBuf::from("configured")]
        );
    }

    #[test]
    fn test_invalid_env_flag() {
        let err = BridgeConfig::default()
            .apply_env(lookup(&[(AUTO_CONVERT_VAR, "maybe")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid value 'maybe' for RUPY_AUTO_CONVERT");
    }
}
