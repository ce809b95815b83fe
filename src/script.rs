// src/script.rs

//! Submission script parsing.
//!
//! A script is a sequence of commands, each opened by an application token
//! (`simulate`, `analyze`, ...) followed by `-name value` parameter pairs.
//! Lines starting with `#` are comments. Parameter names are resolved
//! through an alias table; file-valued parameters are interned in the
//! shared [`FileRegistry`].

use tracing::warn;

use crate::errors::{GridError, Result};
use crate::files::{FileDescriptor, FileIndex, FileKind, FileRegistry};

/// Application a command runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScriptApp {
    Simulate,
    Analyze,
}

impl ScriptApp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "simulate" | "md" => Some(Self::Simulate),
            "analyze" | "energy" => Some(Self::Analyze),
            _ => None,
        }
    }
}

/// Value of one script parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A file interned in the registry.
    File(FileIndex),
    /// A plain string the application consumes as-is.
    Literal(String),
}

/// One command of the submission script.
#[derive(Debug, Clone)]
pub struct ScriptCommand {
    pub app: ScriptApp,
    pub params: Vec<(String, ParamValue)>,
}

impl ScriptCommand {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn file(&self, name: &str) -> Option<FileIndex> {
        match self.get(name)? {
            ParamValue::File(idx) => Some(*idx),
            ParamValue::Literal(_) => None,
        }
    }

    pub fn literal(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ParamValue::Literal(s) => Some(s),
            ParamValue::File(_) => None,
        }
    }
}

/// Canonical parameter names whose values name files the node produces.
const OUTPUT_PARAMS: &[&str] = &["log", "traj", "restart", "out"];

/// Parameters whose value is a plain string, never a file.
const LITERAL_PARAMS: &[&str] = &["frames"];

fn canonical_param(name: &str) -> Option<&'static str> {
    match name {
        "config" | "in" | "i" => Some("config"),
        "coords" | "crd" | "c" => Some("coords"),
        "topology" | "top" | "p" => Some("topology"),
        "log" | "o" => Some("log"),
        "traj" | "trajectory" | "x" => Some("traj"),
        "restart" | "rst" | "r" => Some("restart"),
        "out" | "result" => Some("out"),
        "frames" | "snapshots" => Some("frames"),
        _ => None,
    }
}

/// Split the script into tokens, dropping comment lines, `--` separators
/// and immediately repeated tokens.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for token in text
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .flat_map(str::split_whitespace)
    {
        if token == "--" {
            continue;
        }
        if tokens.last() == Some(&token) {
            warn!(token, "skipping repeated token");
            continue;
        }
        tokens.push(token);
    }
    tokens
}

/// Parse `text` into its commands, interning file names into `registry`.
pub fn parse_script(text: &str, registry: &mut FileRegistry) -> Result<Vec<ScriptCommand>> {
    let mut commands: Vec<ScriptCommand> = Vec::new();

    let mut tokens = tokenize(text).into_iter();

    while let Some(token) = tokens.next() {
        if let Some(app) = ScriptApp::from_token(token) {
            commands.push(ScriptCommand {
                app,
                params: Vec::new(),
            });
            continue;
        }

        if let Some(name) = token.strip_prefix('-') {
            if name == "help" || name == "O" {
                warn!(flag = %token, "ignoring interactive flag");
                continue;
            }
            let Some(command) = commands.last_mut() else {
                return Err(GridError::UnknownCommand(format!(
                    "parameter '{token}' appears before any application token"
                )));
            };
            let Some(value) = tokens.next() else {
                return Err(GridError::InvalidInputParameter(format!(
                    "parameter '{token}' has no value"
                )));
            };

            let canonical = match canonical_param(name) {
                Some(c) => c.to_string(),
                None => {
                    warn!(param = name, "unrecognised parameter, passing through");
                    command
                        .params
                        .push((name.to_string(), ParamValue::Literal(value.to_string())));
                    continue;
                }
            };

            let value = if LITERAL_PARAMS.contains(&canonical.as_str()) {
                ParamValue::Literal(value.to_string())
            } else {
                ParamValue::File(intern_file(registry, value, &canonical))
            };
            command.params.push((canonical, value));
            continue;
        }

        return Err(GridError::UnknownCommand(format!(
            "'{token}' is neither an application nor a parameter"
        )));
    }

    if commands.is_empty() {
        return Err(GridError::UnknownCommand(
            "script contains no commands".to_string(),
        ));
    }

    Ok(commands)
}

fn intern_file(registry: &mut FileRegistry, name: &str, param: &str) -> FileIndex {
    if let Some(idx) = registry.find_by_name(name) {
        return idx;
    }
    let kind = if OUTPUT_PARAMS.contains(&param) {
        FileKind::PermanentOutput
    } else {
        FileKind::PermanentInput
    };
    registry.insert(FileDescriptor::new(name, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\
# equilibrate then score
simulate -config md.in -coords sys.crd -topology sys.top -traj run.traj -restart run.rst
analyze -config en.in -topology sys.top -traj run.traj -out run.dat -frames 1-50
";

    #[test]
    fn parses_two_commands() {
        let mut reg = FileRegistry::new();
        let cmds = parse_script(SCRIPT, &mut reg).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].app, ScriptApp::Simulate);
        assert_eq!(cmds[1].app, ScriptApp::Analyze);
        assert_eq!(cmds[1].literal("frames"), Some("1-50"));
    }

    #[test]
    fn shared_files_are_interned_once() {
        let mut reg = FileRegistry::new();
        let cmds = parse_script(SCRIPT, &mut reg).unwrap();
        let traj_md = cmds[0].file("traj").unwrap();
        let traj_an = cmds[1].file("traj").unwrap();
        assert_eq!(traj_md, traj_an);
        assert!(reg.get(traj_md).unwrap().kind.is_output());
    }

    #[test]
    fn output_kind_follows_parameter_name() {
        let mut reg = FileRegistry::new();
        let cmds = parse_script(SCRIPT, &mut reg).unwrap();
        let top = cmds[0].file("topology").unwrap();
        assert_eq!(reg.get(top).unwrap().kind, FileKind::PermanentInput);
        let out = cmds[1].file("out").unwrap();
        assert_eq!(reg.get(out).unwrap().kind, FileKind::PermanentOutput);
    }

    #[test]
    fn aliases_resolve_to_canonical_names() {
        let mut reg = FileRegistry::new();
        let cmds = parse_script("md -i a.in -c b.crd -p c.top -x d.traj", &mut reg).unwrap();
        assert!(cmds[0].file("config").is_some());
        assert!(cmds[0].file("coords").is_some());
        assert!(cmds[0].file("traj").is_some());
    }

    #[test]
    fn repeated_tokens_and_separators_are_skipped() {
        let mut reg = FileRegistry::new();
        let cmds =
            parse_script("simulate -- -config -config md.in", &mut reg).unwrap();
        // the duplicated "-config" collapses; only one param survives
        assert_eq!(cmds[0].params.len(), 1);
        assert!(cmds[0].file("config").is_some());
    }

    #[test]
    fn bare_value_without_app_is_an_error() {
        let mut reg = FileRegistry::new();
        let err = parse_script("md.in simulate", &mut reg).unwrap_err();
        assert!(matches!(err, GridError::UnknownCommand(_)));
    }

    #[test]
    fn interactive_flags_are_ignored() {
        let mut reg = FileRegistry::new();
        let cmds = parse_script("simulate -O -config md.in", &mut reg).unwrap();
        assert_eq!(cmds[0].params.len(), 1);
    }

    #[test]
    fn empty_script_is_an_error() {
        let mut reg = FileRegistry::new();
        assert!(parse_script("# only a comment\n", &mut reg).is_err());
    }
}
