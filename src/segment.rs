// src/segment.rs

//! Splitting a long simulation into bounded segments.
//!
//! Compute nodes are only trusted with a bounded amount of work, so any
//! simulation longer than [`STEPS_PER_UNIT`] steps is cut into a chain of
//! restart-linked segments. When the run writes trajectory snapshots the
//! cut points must fall on snapshot boundaries, otherwise frames would be
//! lost at the seams.

use tracing::warn;

use crate::errors::{GridError, Result};
use crate::params::ParameterSet;

/// Largest number of simulation steps a single compute node is handed.
pub const STEPS_PER_UNIT: u64 = 30_000;

/// Estimate reference points, fitted against benchmark runs.
const ESTIMATE_BASE: f64 = 6_973.24;
const ESTIMATE_QUADRATIC: f64 = 286.29;
const ESTIMATE_LINEAR: f64 = 1_452.50;
const REFERENCE_ATOMS: f64 = 17_617.0;
const REFERENCE_STEPS: f64 = 25_000.0;
const NORMALISATION: f64 = 0.9;
const DEFAULT_ESTIMATE: f64 = 11_000.0;

/// Predicted work units for one segment.
///
/// The fit is quadratic in the interaction cutoff and scales linearly with
/// system size and segment length. A zero cutoff means the engine default,
/// for which only a flat figure is known.
pub fn estimate_units(cutoff: f64, atoms: u64, steps: u64) -> f64 {
    if cutoff == 0.0 {
        return DEFAULT_ESTIMATE;
    }
    let fitted = ESTIMATE_BASE + ESTIMATE_QUADRATIC * cutoff * cutoff - ESTIMATE_LINEAR * cutoff;
    fitted * (atoms as f64 / REFERENCE_ATOMS) * (steps as f64 / REFERENCE_STEPS) / NORMALISATION
}

/// Number of segments a run of `steps` steps must be cut into.
///
/// With a snapshot `stride`, every segment must hold a whole number of
/// strides; when no such split exists within the per-unit limit the run
/// cannot be segmented at all.
pub fn segment_count(steps: u64, stride: u64) -> Result<u64> {
    if steps <= STEPS_PER_UNIT {
        return Ok(1);
    }
    if stride == 0 {
        let mut count = 2;
        while steps / count > STEPS_PER_UNIT {
            count += 1;
        }
        return Ok(count);
    }

    let mut strides_per_segment = STEPS_PER_UNIT / stride;
    while strides_per_segment > 0 && steps % (strides_per_segment * stride) != 0 {
        strides_per_segment -= 1;
    }
    if strides_per_segment == 0 {
        return Err(GridError::ExceededResourceLimit(format!(
            "no split of {steps} steps at stride {stride} fits within {STEPS_PER_UNIT} \
             steps per segment"
        )));
    }
    Ok(steps / (strides_per_segment * stride))
}

/// What the parameter file says about the run, as far as segmentation cares.
#[derive(Debug, Clone)]
pub struct SimulationShape {
    pub steps: u64,
    pub stride: u64,
    pub cutoff: f64,
    pub minimisation: bool,
    pub constant_pressure: bool,
    pub positional_restraints: bool,
    pub user_seed: Option<i64>,
}

impl SimulationShape {
    pub fn from_parameters(params: &ParameterSet) -> Self {
        Self {
            steps: params.get_i64("steps").unwrap_or(0).max(0) as u64,
            stride: params.get_i64("stride").unwrap_or(0).max(0) as u64,
            cutoff: params.get_f64("cutoff").unwrap_or(0.0),
            minimisation: params.get_i64("minimize").unwrap_or(0) != 0,
            constant_pressure: params.get_i64("pressure").unwrap_or(0) != 0,
            positional_restraints: params.get_i64("restrain").unwrap_or(0) != 0,
            user_seed: params.get_i64("seed"),
        }
    }

    /// Runs that must stay whole: energy minimisation has no notion of a
    /// restart point, and restrained constant-pressure runs reference the
    /// initial coordinates, which a restart would replace.
    pub fn splittable(&self) -> bool {
        if self.minimisation {
            return false;
        }
        !(self.constant_pressure && self.positional_restraints)
    }
}

/// One planned segment of a simulation command.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSpec {
    pub steps: u64,
    /// Snapshots this segment writes to the trajectory.
    pub snapshots: u64,
    pub estimate: f64,
    /// True for every segment but the first; these restart from the
    /// previous segment's output.
    pub continuation: bool,
}

/// Plan the segment chain for `shape` on a system of `atoms` atoms.
pub fn plan(shape: &SimulationShape, atoms: u64) -> Result<Vec<SegmentSpec>> {
    let count = if shape.splittable() {
        segment_count(shape.steps, shape.stride)
    } else {
        Ok(1)
    }?;

    if count == 1 {
        return Ok(vec![SegmentSpec {
            steps: shape.steps,
            snapshots: snapshots_in(shape.steps, shape.stride),
            estimate: estimate_units(shape.cutoff, atoms, shape.steps),
            continuation: false,
        }]);
    }

    let head = shape.steps.div_ceil(count);
    let mut segments = Vec::with_capacity(count as usize);
    let mut remaining = shape.steps;
    for i in 0..count {
        let steps = if i + 1 < count { head } else { remaining };
        remaining -= steps;
        segments.push(SegmentSpec {
            steps,
            snapshots: snapshots_in(steps, shape.stride),
            estimate: estimate_units(shape.cutoff, atoms, steps),
            continuation: i > 0,
        });
    }
    Ok(segments)
}

fn snapshots_in(steps: u64, stride: u64) -> u64 {
    if stride == 0 { 0 } else { steps / stride }
}

/// Rewrite `params` for one segment of the chain.
///
/// The checkpoint interval is pinned to the segment length so exactly one
/// restart point is written, at the end. Continuations restart from it and
/// must not re-seed the thermostat, or the trajectory would decorrelate
/// from the single-node reference run.
pub fn apply_segment(params: &mut ParameterSet, spec: &SegmentSpec) {
    params.set("steps", spec.steps.to_string());
    params.set("checkpoint", spec.steps.to_string());
    if spec.continuation {
        params.set("restart", "1");
        if params.get("seed").is_some() {
            warn!("overriding user random seed on continuation segment");
        }
        params.set("seed", "-1");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::parse_parameter_set;

    #[test]
    fn short_run_is_one_segment() {
        assert_eq!(segment_count(30_000, 0).unwrap(), 1);
        assert_eq!(segment_count(100, 50).unwrap(), 1);
    }

    #[test]
    fn unstrided_run_splits_by_limit() {
        assert_eq!(segment_count(60_000, 0).unwrap(), 2);
        assert_eq!(segment_count(70_000, 0).unwrap(), 3);
        // 90001 / 3 floors to 30000, within the limit
        assert_eq!(segment_count(90_001, 0).unwrap(), 3);
    }

    #[test]
    fn strided_run_splits_on_stride_boundaries() {
        // 60000 steps at stride 500: 60 strides per segment fit, 60000 is
        // divisible by 30000, so two segments.
        assert_eq!(segment_count(60_000, 500).unwrap(), 2);
        // 70000 at stride 700 is 100 strides; 42 per segment do not divide
        // them evenly, the first count that does is 25 strides per segment.
        assert_eq!(segment_count(70_000, 700).unwrap(), 4);
    }

    #[test]
    fn impossible_stride_split_is_reported() {
        let err = segment_count(60_001, 40_000).unwrap_err();
        assert!(matches!(err, GridError::ExceededResourceLimit(_)));
    }

    #[test]
    fn planned_segments_cover_all_steps() {
        let shape = SimulationShape {
            steps: 70_000,
            stride: 0,
            cutoff: 0.8,
            minimisation: false,
            constant_pressure: false,
            positional_restraints: false,
            user_seed: None,
        };
        let segs = plan(&shape, 17_617).unwrap();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs.iter().map(|s| s.steps).sum::<u64>(), 70_000);
        assert!(!segs[0].continuation);
        assert!(segs[1].continuation && segs[2].continuation);
    }

    #[test]
    fn minimisation_never_splits() {
        let shape = SimulationShape {
            steps: 500_000,
            stride: 0,
            cutoff: 0.8,
            minimisation: true,
            constant_pressure: false,
            positional_restraints: false,
            user_seed: None,
        };
        let segs = plan(&shape, 10_000).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].steps, 500_000);
    }

    #[test]
    fn restrained_pressure_run_never_splits() {
        let shape = SimulationShape {
            steps: 90_000,
            stride: 0,
            cutoff: 0.8,
            minimisation: false,
            constant_pressure: true,
            positional_restraints: true,
            user_seed: None,
        };
        assert_eq!(plan(&shape, 10_000).unwrap().len(), 1);
    }

    #[test]
    fn default_estimate_for_zero_cutoff() {
        assert_eq!(estimate_units(0.0, 50_000, 100_000), 11_000.0);
    }

    #[test]
    fn estimate_at_reference_point() {
        let e = estimate_units(1.0, 17_617, 25_000);
        let expected = (6_973.24 + 286.29 - 1_452.50) / 0.9;
        assert!((e - expected).abs() < 1e-6);
    }

    #[test]
    fn apply_segment_rewrites_continuations() {
        let mut params =
            parse_parameter_set("t\n&control\nsteps=60000, seed=42,\n/\n").unwrap();
        let spec = SegmentSpec {
            steps: 30_000,
            snapshots: 0,
            estimate: 0.0,
            continuation: true,
        };
        apply_segment(&mut params, &spec);
        assert_eq!(params.get_i64("steps"), Some(30_000));
        assert_eq!(params.get_i64("checkpoint"), Some(30_000));
        assert_eq!(params.get_i64("restart"), Some(1));
        assert_eq!(params.get_i64("seed"), Some(-1));
    }
}
