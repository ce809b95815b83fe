// src/graph/node.rs

use crate::files::{FileIndex, FileRegistry};
use crate::graph::LocalId;

/// Application a job node runs.
///
/// The first two execute on remote compute nodes; the rest are cheap
/// bookkeeping steps the scheduler runs in-process.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AppKind {
    Simulate,
    Analyze,
    ExtractFrames,
    CleanupFrames,
    RecombineSimulate,
    RecombineAnalyze,
}

impl AppKind {
    pub fn code(self) -> i64 {
        match self {
            Self::Simulate => 1,
            Self::Analyze => 2,
            Self::ExtractFrames => 3,
            Self::CleanupFrames => 4,
            Self::RecombineSimulate => 5,
            Self::RecombineAnalyze => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Simulate),
            2 => Some(Self::Analyze),
            3 => Some(Self::ExtractFrames),
            4 => Some(Self::CleanupFrames),
            5 => Some(Self::RecombineSimulate),
            6 => Some(Self::RecombineAnalyze),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Simulate => "simulate",
            Self::Analyze => "analyze",
            Self::ExtractFrames => "extract_frames",
            Self::CleanupFrames => "cleanup_frames",
            Self::RecombineSimulate => "recombine_simulate",
            Self::RecombineAnalyze => "recombine_analyze",
        }
    }

    /// Internal apps run inside the scheduler instead of being dispatched.
    pub fn is_internal(self) -> bool {
        !matches!(self, Self::Simulate | Self::Analyze)
    }
}

/// Argument value of a job node.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    File(FileIndex),
    Literal(String),
}

/// One named argument, mirroring the `-name value` script form.
#[derive(Debug, Clone)]
pub struct NodeArg {
    pub name: String,
    pub value: ArgValue,
}

impl NodeArg {
    pub fn file(name: impl Into<String>, idx: FileIndex) -> Self {
        Self {
            name: name.into(),
            value: ArgValue::File(idx),
        }
    }

    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ArgValue::Literal(value.into()),
        }
    }
}

/// One job of a batch graph.
#[derive(Debug, Clone)]
pub struct JobNode {
    pub local_id: LocalId,
    pub app: AppKind,
    /// Hard ordering prerequisite; file parents add further edges.
    pub prereq: Option<LocalId>,
    pub args: Vec<NodeArg>,
    /// Predicted work units, attached to the dispatch unit.
    pub estimate: f64,
    /// Global index of the snapshot preceding this node's first frame.
    pub snapshot_offset: u64,
}

impl JobNode {
    pub fn files(&self) -> impl Iterator<Item = FileIndex> + '_ {
        self.args.iter().filter_map(|a| match a.value {
            ArgValue::File(idx) => Some(idx),
            ArgValue::Literal(_) => None,
        })
    }

    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.args
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    pub fn file_arg(&self, name: &str) -> Option<FileIndex> {
        match self.arg(name)? {
            ArgValue::File(idx) => Some(*idx),
            ArgValue::Literal(_) => None,
        }
    }
}

/// A complete, not-yet-persisted batch: its nodes plus the file arena
/// their arguments index into.
#[derive(Debug, Default)]
pub struct Batch {
    pub nodes: Vec<JobNode>,
    pub registry: FileRegistry,
}

impl Batch {
    pub fn node(&self, id: LocalId) -> Option<&JobNode> {
        self.nodes.iter().find(|n| n.local_id == id)
    }

    pub(crate) fn next_id(&self) -> LocalId {
        self.nodes.len() as LocalId + 1
    }
}
