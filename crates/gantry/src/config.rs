//! Host Configuration
//!
//! Layered configuration: compiled defaults, then an optional TOML file,
//! then `GANTRY_`-prefixed environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::types::{Error, Result};

/// Top-level host configuration (gantry.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub addins: AddinPaths,
}

impl HostConfig {
    /// Load configuration, merging `path` and the environment over the
    /// defaults. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        Figment::from(Serialized::defaults(HostConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GANTRY_").split("__"))
            .extract()
            .map_err(|e| Error::Configuration(format!("failed to load configuration: {e}")))
    }

    /// Per-call dispatch deadline
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.server.call_timeout_secs)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_call_timeout_secs() -> u64 {
    30
}

/// Addin directory layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddinPaths {
    /// Where transferred files wait before installation
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Where installed addin modules live
    #[serde(default = "default_addin_dir")]
    pub addin_dir: PathBuf,
    /// Manifest of installed addins
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
}

impl Default for AddinPaths {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            addin_dir: default_addin_dir(),
            manifest: default_manifest(),
        }
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("data/staging")
}

fn default_addin_dir() -> PathBuf {
    PathBuf::from("data/addins")
}

fn default_manifest() -> PathBuf {
    PathBuf::from("data/addins.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.addins.staging_dir, PathBuf::from("data/staging"));
        assert_eq!(config.addins.manifest, PathBuf::from("data/addins.json"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = HostConfig::load(Path::new("/nonexistent/gantry.toml")).unwrap();
        assert_eq!(config.server.port, 5001);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gantry.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 6001
call_timeout_secs = 5

[addins]
addin_dir = "modules"
"#,
        )
        .unwrap();

        let config = HostConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 6001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.addins.addin_dir, PathBuf::from("modules"));
        assert_eq!(config.addins.staging_dir, PathBuf::from("data/staging"));
    }
}
