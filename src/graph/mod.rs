// src/graph/mod.rs

//! In-memory job graph built from a parsed submission script.
//!
//! The graph only exists between parsing and persistence; once a batch is
//! stored, the scheduler works from the database alone.

pub mod builder;
pub mod export;
pub mod node;

pub use builder::build_batch;
pub use export::{render_dot, validate_acyclic};
pub use node::{AppKind, ArgValue, Batch, JobNode, NodeArg};

/// Node id local to one batch, assigned in creation order starting at 1.
pub type LocalId = u32;
