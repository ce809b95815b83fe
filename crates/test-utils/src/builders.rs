#![allow(dead_code)]

use simqueue::config::{ConfigFile, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_store_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.store.path = path.into();
        self
    }

    pub fn with_intermediate_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.dirs.intermediate = dir.into();
        self
    }

    pub fn with_archive_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.dirs.archive = dir.into();
        self
    }

    pub fn with_error_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.dirs.error = Some(dir.into());
        self
    }

    pub fn with_max_batch_snapshots(mut self, max: u64) -> Self {
        self.config.limits.max_batch_snapshots = max;
        self
    }

    pub fn with_max_stage_file_mb(mut self, mb: u64) -> Self {
        self.config.limits.max_stage_file_mb = mb;
        self
    }

    pub fn with_privileged_uid(mut self, uid: u32) -> Self {
        self.config.auth.privileged_uid = Some(uid);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for submission scripts.
pub struct ScriptBuilder {
    lines: Vec<String>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn simulate(mut self) -> Self {
        self.lines.push("simulate".to_string());
        self
    }

    pub fn analyze(mut self) -> Self {
        self.lines.push("analyze".to_string());
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.push_str(&format!(" -{name} {value}"));
        }
        self
    }

    pub fn build(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for namelist-style parameter files.
pub struct ParameterFileBuilder {
    title: String,
    entries: Vec<(String, String)>,
}

impl ParameterFileBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.entries.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> String {
        let mut text = format!("{}\n&control\n", self.title);
        for (key, value) in &self.entries {
            text.push_str(&format!("  {key}={value},\n"));
        }
        text.push_str("/\n");
        text
    }
}
