use std::path::{Path, PathBuf};

use tracing::{debug, info};
use waymark_common::{Error, Result};

use crate::model::AppConfig;

/// File names probed, in order, when no explicit config path is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["waymark.yml", "waymark.yaml", "waymark.toml"];

/// Locates and parses the configuration file.
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Use an explicit config file. It must exist.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Probe `dir` for one of [`DEFAULT_CONFIG_FILES`]. Falls back to
    /// defaults if none is present.
    pub fn discover(dir: &Path) -> Self {
        let path = DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file());
        if path.is_none() {
            debug!("no config file found in {}", dir.display());
        }
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let Some(path) = &self.path else {
            return Ok(AppConfig::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = parse(path, &contents)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}

fn parse(path: &Path, contents: &str) -> Result<AppConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other:?}"
        ))),
    }
}
