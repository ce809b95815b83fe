// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{GridError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = GridError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_limits(cfg)?;
    validate_dirs(cfg)?;
    Ok(())
}

fn validate_limits(cfg: &RawConfigFile) -> Result<()> {
    if cfg.limits.max_batch_snapshots == 0 {
        return Err(GridError::Config(
            "[limits].max_batch_snapshots must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.limits.max_stage_file_mb == 0 {
        return Err(GridError::Config(
            "[limits].max_stage_file_mb must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_dirs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.dirs.intermediate.as_os_str().is_empty() {
        return Err(GridError::Config(
            "[dirs].intermediate must not be empty".to_string(),
        ));
    }

    if cfg.dirs.archive.as_os_str().is_empty() {
        return Err(GridError::Config(
            "[dirs].archive must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_raw_config_validates() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.limits.max_batch_snapshots, 10);
        assert_eq!(cfg.limits.max_stage_file_mb, 20);
    }

    #[test]
    fn zero_batch_limit_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.limits.max_batch_snapshots = 0;
        match ConfigFile::try_from(raw) {
            Err(GridError::Config(msg)) => assert!(msg.contains("max_batch_snapshots")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
