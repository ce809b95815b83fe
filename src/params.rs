// src/params.rs

//! Namelist-style parameter files for the simulation engine.
//!
//! The format is line based: the first line is a free-form title, a line
//! starting with `&` opens a named group and a line whose first token is
//! `/` closes it. Inside a group, entries are comma-separated `key=value`
//! pairs which may span multiple lines.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::warn;

use crate::errors::{GridError, Result};

/// Keys the queue manages itself. A script that sets one of these would
/// fight the segmenter, so submission is rejected outright.
pub const BARRED_PARAMETERS: &[&str] = &["checkpoint"];

/// One `&name ... /` group.
#[derive(Debug, Clone, PartialEq)]
pub struct Namelist {
    pub name: String,
    entries: BTreeMap<String, String>,
}

impl Namelist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A parsed parameter file: title line plus its namelist groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    pub title: String,
    pub namelists: Vec<Namelist>,
}

impl ParameterSet {
    /// First value of `key` across all groups, in file order.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.namelists.iter().find_map(|nl| nl.get(key))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Set `key` in the group that already holds it, or in the first group.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(nl) = self.namelists.iter_mut().find(|nl| nl.get(key).is_some()) {
            nl.set(key, value);
        } else if let Some(first) = self.namelists.first_mut() {
            first.set(key, value);
        }
    }

    /// Remove `key` from every group, returning whether anything was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let mut removed = false;
        for nl in &mut self.namelists {
            removed |= nl.remove(key).is_some();
        }
        removed
    }

    /// Render back into the namelist text format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        for nl in &self.namelists {
            let _ = writeln!(out, "&{}", nl.name);
            for (k, v) in nl.entries() {
                let _ = writeln!(out, "  {k}={v},");
            }
            let _ = writeln!(out, "/");
        }
        out
    }
}

/// Parse the text of a parameter file.
///
/// Keys are trimmed and lower-cased. A key from [`BARRED_PARAMETERS`] is an
/// error: the queue owns those settings.
pub fn parse_parameter_set(text: &str) -> Result<ParameterSet> {
    let mut lines = text.lines();
    let title = lines.next().unwrap_or("").trim().to_string();

    let mut set = ParameterSet {
        title,
        namelists: Vec::new(),
    };
    let mut current: Option<Namelist> = None;
    let mut pending = String::new();

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(name) = trimmed.strip_prefix('&') {
            if current.is_some() {
                return Err(GridError::InvalidInputParameter(format!(
                    "namelist '&{name}' opened before the previous group was closed"
                )));
            }
            current = Some(Namelist::new(name.trim()));
            continue;
        }
        if trimmed == "/" || trimmed.starts_with("/ ") {
            let mut nl = current.take().ok_or_else(|| {
                GridError::InvalidInputParameter(
                    "'/' terminator outside any namelist group".to_string(),
                )
            })?;
            commit_entries(&mut nl, &pending)?;
            pending.clear();
            set.namelists.push(nl);
            continue;
        }
        match current {
            Some(_) => {
                pending.push_str(trimmed);
                pending.push(',');
            }
            None => warn!(line = %trimmed, "ignoring text outside any namelist group"),
        }
    }

    if current.is_some() {
        return Err(GridError::InvalidInputParameter(
            "unterminated namelist group at end of file".to_string(),
        ));
    }

    Ok(set)
}

fn commit_entries(nl: &mut Namelist, pending: &str) -> Result<()> {
    for piece in pending.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let Some((key, value)) = piece.split_once('=') else {
            return Err(GridError::InvalidInputParameter(format!(
                "expected key=value in namelist '{}', got '{piece}'",
                nl.name
            )));
        };
        let key = key.trim().to_lowercase();
        if BARRED_PARAMETERS.contains(&key.as_str()) {
            return Err(GridError::InvalidInputParameter(format!(
                "parameter '{key}' is managed by the queue and may not be set"
            )));
        }
        nl.set(key, value.trim().to_string());
    }
    Ok(())
}
