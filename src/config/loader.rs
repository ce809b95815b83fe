// src/config/loader.rs

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Default config file name, resolved against the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Simqueue.toml")
}

/// Read and deserialise the raw config from `path`.
pub fn load_from_path(path: &Path) -> Result<RawConfigFile> {
    let text = std::fs::read_to_string(path)?;
    let raw: RawConfigFile = toml::from_str(&text)?;
    Ok(raw)
}

/// Load the config from `path` and run it through validation.
pub fn load_and_validate(path: &Path) -> Result<ConfigFile> {
    let raw = load_from_path(path)?;
    ConfigFile::try_from(raw)
}

/// Load the config from `path`, falling back to built-in defaults when the
/// file does not exist. Any other read or parse error is still reported.
pub fn load_or_default(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(ConfigFile::default());
    }
    load_and_validate(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.limits.max_batch_snapshots, 10);
        assert_eq!(cfg.store.path, PathBuf::from("simqueue.db"));
    }

    #[test]
    fn loads_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Simqueue.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[limits]\nmax_batch_snapshots = 4").unwrap();

        let cfg = load_and_validate(&path).unwrap();
        assert_eq!(cfg.limits.max_batch_snapshots, 4);
        assert_eq!(cfg.limits.max_stage_file_mb, 20);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Simqueue.toml");
        std::fs::write(&path, "[limits]\nmax_snapshots = 4\n").unwrap();
        assert!(load_and_validate(&path).is_err());
    }
}
