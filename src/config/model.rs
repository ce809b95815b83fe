// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Raw configuration exactly as deserialised from `Simqueue.toml`.
///
/// Use [`ConfigFile::try_from`] (via `config::load_and_validate`) to obtain
/// a checked config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub dirs: DirsSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Path to the SQLite job store.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirsSection {
    /// Subdirectory for intermediate (temporary) files shared between
    /// chained segments.
    #[serde(default = "default_intermediate_dir")]
    pub intermediate: PathBuf,

    /// Directory that receives the per-batch raw-data archive when a batch
    /// is closed.
    #[serde(default = "default_archive_dir")]
    pub archive: PathBuf,

    /// Optional fallback area for the inputs of jobs whose staging failed.
    #[serde(default)]
    pub error: Option<PathBuf>,
}

impl Default for DirsSection {
    fn default() -> Self {
        Self {
            intermediate: default_intermediate_dir(),
            archive: default_archive_dir(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    /// Maximum number of snapshots per analysis batch node.
    #[serde(default = "default_max_batch_snapshots")]
    pub max_batch_snapshots: u64,

    /// Largest file (in MB) staged whole to a compute node; bigger
    /// trajectories get a frame-extraction step instead.
    #[serde(default = "default_max_stage_file_mb")]
    pub max_stage_file_mb: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_batch_snapshots: default_max_batch_snapshots(),
            max_stage_file_mb: default_max_stage_file_mb(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// Uid allowed to manage every batch regardless of ownership
    /// (typically the queue daemon).
    #[serde(default)]
    pub privileged_uid: Option<u32>,
}

/// Validated configuration. Construct via `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub store: StoreSection,
    pub dirs: DirsSection,
    pub limits: LimitsSection,
    pub auth: AuthSection,
}

impl ConfigFile {
    /// Used by the validation layer once all checks have passed.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            store: raw.store,
            dirs: raw.dirs,
            limits: raw.limits,
            auth: raw.auth,
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("simqueue.db")
}

fn default_intermediate_dir() -> PathBuf {
    PathBuf::from("grid_temp_files")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_batch_snapshots() -> u64 {
    10
}

fn default_max_stage_file_mb() -> u64 {
    20
}
