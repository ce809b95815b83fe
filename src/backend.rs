// src/backend.rs

//! Seam between the scheduler and the distributed-compute system.
//!
//! The scheduler prepares a [`DispatchUnit`] per ready job and hands it to
//! a [`ComputeBackend`]; completion reports come back asynchronously via
//! the `complete` CLI verb. The default backend only records the handoff,
//! which keeps every state transition testable without a grid attached.

use chrono::Utc;
use tracing::info;

use crate::errors::Result;
use crate::graph::AppKind;
use crate::store::JobId;

/// One file staged to or fetched from a compute node.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedFile {
    /// Name the application opens the file under.
    pub alias: String,
    /// Path on the submitting host.
    pub path: String,
}

/// Everything the compute system needs to run one job.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    pub job: JobId,
    /// Globally unique unit name, `<app>_<hex job id>_<timestamp>`.
    pub name: String,
    pub app: AppKind,
    /// Literal command-line arguments.
    pub arguments: String,
    pub inputs: Vec<StagedFile>,
    pub outputs: Vec<StagedFile>,
    /// Predicted work units, used for node selection and credit.
    pub estimate: f64,
}

/// Name a dispatch unit for `job`. Job ids are rendered in hex, matching
/// the unit names on the grid side.
pub fn unit_name(app: AppKind, job: JobId) -> String {
    format!(
        "{}_{:x}_{}",
        app.name(),
        job,
        Utc::now().format("%Y%m%dT%H%M%SZ")
    )
}

/// Dispatch seam the scheduler drives.
pub trait ComputeBackend {
    fn dispatch(&mut self, unit: &DispatchUnit) -> Result<()>;
}

/// Backend that logs each dispatch instead of submitting it.
#[derive(Debug, Default)]
pub struct SimulatedBackend;

impl ComputeBackend for SimulatedBackend {
    fn dispatch(&mut self, unit: &DispatchUnit) -> Result<()> {
        info!(
            job = unit.job,
            unit = %unit.name,
            app = unit.app.name(),
            inputs = unit.inputs.len(),
            outputs = unit.outputs.len(),
            estimate = unit.estimate,
            "dispatching work unit"
        );
        Ok(())
    }
}
