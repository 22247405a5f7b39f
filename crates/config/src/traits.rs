//! Load and store configuration files.

use eyre::Context as _;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File},
    io::Write as _,
    path::Path,
};
use tracing::info;

/// The serialization format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFmt {
    /// Human-edited config files.
    YAML,
    /// Machine-generated config files.
    JSON,
}

impl ConfigFmt {
    /// Infer the format from a file extension. Anything that isn't `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::JSON,
            _ => Self::YAML,
        }
    }
}

/// Read and write serializable configuration.
pub trait ConfigTrait {
    /// Load a config from `path`.
    fn load_from_path<T>(path: &Path, fmt: ConfigFmt) -> eyre::Result<T>
    where
        T: DeserializeOwned,
    {
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        let config = match fmt {
            ConfigFmt::YAML => serde_yaml::from_str(&contents)?,
            ConfigFmt::JSON => serde_json::from_str(&contents)?,
        };

        info!(target: "config", ?path, "loaded config");
        Ok(config)
    }

    /// Serialize `value` and write it to `path`, creating parent directories as needed.
    fn write_to_path<T>(path: &Path, value: &T, fmt: ConfigFmt) -> eyre::Result<()>
    where
        T: Serialize,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = match fmt {
            ConfigFmt::YAML => serde_yaml::to_string(value)?,
            ConfigFmt::JSON => serde_json::to_string_pretty(value)?,
        };

        let mut file = File::create(path)
            .wrap_err_with(|| format!("failed to create config file {}", path.display()))?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }
}

/// Unit type for loading and storing config files that don't own a [ConfigTrait] impl.
#[derive(Debug)]
pub struct Config;

impl ConfigTrait for Config {}
