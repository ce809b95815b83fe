// src/graph/builder.rs

//! Expansion of script commands into a batch job graph.
//!
//! Simulation commands longer than one work unit become restart-linked
//! segment chains; analysis commands become parallel per-snapshot-range
//! batches. Both expansions end in a recombination node that reassembles
//! the logical outputs the user asked for.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::errors::{GridError, Result};
use crate::files::{FileDescriptor, FileIndex, FileKind, FileRegistry};
use crate::graph::node::{AppKind, ArgValue, Batch, JobNode, NodeArg};
use crate::graph::{LocalId, export};
use crate::params::{ParameterSet, parse_parameter_set};
use crate::script::{ParamValue, ScriptApp, ScriptCommand};
use crate::segment::{self, SegmentSpec, SimulationShape};

/// One produced piece of a logical output, pending recombination.
#[derive(Debug, Clone)]
struct Part {
    producer: LocalId,
    /// Global snapshot offset of the piece, for ordering.
    offset: u64,
    name: String,
}

/// Where an analysis batch reads its trajectory from.
#[derive(Debug, Clone)]
struct TrajSource {
    name: String,
    subdirectory: Option<String>,
    parent: Option<LocalId>,
    temporary: bool,
}

/// Build the job graph for `commands`, consuming the file registry the
/// script parser filled.
pub fn build_batch(
    cfg: &ConfigFile,
    commands: &[ScriptCommand],
    registry: FileRegistry,
) -> Result<Batch> {
    let mut builder = Builder {
        cfg,
        batch: Batch {
            nodes: Vec::new(),
            registry,
        },
        tail: None,
    };

    let mut i = 0;
    while i < commands.len() {
        let cmd = &commands[i];
        match cmd.app {
            ScriptApp::Simulate => {
                let follower = commands
                    .get(i + 1)
                    .filter(|c| c.app == ScriptApp::Analyze);
                let consumed = builder.expand_simulation(cmd, follower)?;
                i += if consumed { 2 } else { 1 };
            }
            ScriptApp::Analyze => {
                builder.expand_analysis(cmd)?;
                i += 1;
            }
        }
    }

    export::validate_acyclic(&builder.batch)?;
    Ok(builder.batch)
}

struct Builder<'a> {
    cfg: &'a ConfigFile,
    batch: Batch,
    /// Last node of the previous command; ordering prerequisite for the
    /// next one.
    tail: Option<LocalId>,
}

impl Builder<'_> {
    // ---- simulation expansion ----------------------------------------

    /// Expand one simulation command. Returns true when the following
    /// analysis command was interleaved into the chain and is consumed.
    fn expand_simulation(
        &mut self,
        cmd: &ScriptCommand,
        follower: Option<&ScriptCommand>,
    ) -> Result<bool> {
        let config_idx = self.require_file(cmd, "config")?;
        let coords_idx = self.require_file(cmd, "coords")?;
        let topology_idx = self.require_file(cmd, "topology")?;

        let params = self.load_parameters(config_idx)?;
        let atoms = self.resolve_atom_count(&params, topology_idx)?;
        let shape = SimulationShape::from_parameters(&params);
        let segments = segment::plan(&shape, atoms)?;

        if segments.len() == 1 {
            let id = self.single_simulation_node(cmd, &segments[0])?;
            self.tail = Some(id);
            return Ok(false);
        }

        // Only interleave when the analysis reads the trajectory this
        // chain produces.
        let interleave = match (follower, cmd.file("traj")) {
            (Some(an), Some(traj_idx)) => {
                let traj_name = self.name_of(traj_idx);
                an.file("traj")
                    .map(|idx| self.name_of(idx) == traj_name)
                    .unwrap_or(false)
            }
            _ => false,
        };

        let total_snapshots: u64 = segments.iter().map(|s| s.snapshots).sum();
        let frames = match follower.filter(|_| interleave) {
            Some(an) => match an.literal("frames") {
                Some(spec) => parse_frame_list(spec)?,
                None => (1..=total_snapshots).collect(),
            },
            None => Vec::new(),
        };

        info!(
            segments = segments.len(),
            steps = shape.steps,
            interleave,
            "expanding simulation into a segment chain"
        );

        let mut prev_md: Option<LocalId> = None;
        let mut cum_snapshots: u64 = 0;
        let mut traj_parts: Vec<Part> = Vec::new();
        let mut log_parts: Vec<Part> = Vec::new();
        let mut analysis_parts: Vec<Part> = Vec::new();
        let last = segments.len() - 1;

        for (k, spec) in segments.iter().enumerate() {
            let id = self.batch.next_id();
            let mut args = Vec::new();

            let seg_config = self.write_segment_parameters(&params, spec, config_idx, id)?;
            args.push(NodeArg::file("config", seg_config));

            if spec.continuation {
                let prev = prev_md.ok_or_else(|| {
                    GridError::NullReference(format!(
                        "continuation segment {id} has no predecessor"
                    ))
                })?;
                let restart_name = cmd
                    .file("restart")
                    .map(|idx| self.name_of(idx))
                    .ok_or_else(|| {
                        GridError::InvalidInputParameter(
                            "segmented simulation requires a restart output".to_string(),
                        )
                    })?;
                let coords = self.batch.registry.insert(
                    FileDescriptor::new(
                        part_name(&restart_name, prev),
                        FileKind::TemporaryInput,
                    )
                    .with_alias(base_name(&restart_name))
                    .with_subdirectory(self.intermediate_dir())
                    .with_parent(prev),
                );
                args.push(NodeArg::file("coords", coords));
            } else {
                args.push(NodeArg::file("coords", self.resolve_input(coords_idx)?));
            }
            args.push(NodeArg::file("topology", self.resolve_input(topology_idx)?));

            for (param, parts) in [("traj", &mut traj_parts), ("log", &mut log_parts)] {
                if let Some(logical) = cmd.file(param) {
                    let logical_name = self.name_of(logical);
                    let piece = part_name(&logical_name, id);
                    let idx = self.batch.registry.insert(
                        FileDescriptor::new(&piece, FileKind::TemporaryOutput)
                            .with_alias(base_name(&logical_name))
                            .with_subdirectory(self.intermediate_dir()),
                    );
                    args.push(NodeArg::file(param, idx));
                    parts.push(Part {
                        producer: id,
                        offset: cum_snapshots,
                        name: piece,
                    });
                }
            }

            if let Some(restart_idx) = cmd.file("restart") {
                if k == last {
                    // final restart stays under its own name
                    args.push(NodeArg::file("restart", restart_idx));
                } else {
                    let restart_name = self.name_of(restart_idx);
                    let idx = self.batch.registry.insert(
                        FileDescriptor::new(
                            part_name(&restart_name, id),
                            FileKind::TemporaryOutput,
                        )
                        .with_alias(base_name(&restart_name))
                        .with_subdirectory(self.intermediate_dir()),
                    );
                    args.push(NodeArg::file("restart", idx));
                }
            }

            self.copy_passthrough(cmd, &mut args)?;

            self.batch.nodes.push(JobNode {
                local_id: id,
                app: AppKind::Simulate,
                prereq: prev_md.or(self.tail),
                args,
                estimate: spec.estimate,
                snapshot_offset: cum_snapshots,
            });

            if interleave && spec.snapshots > 0 {
                let an = follower.ok_or_else(|| {
                    GridError::NullReference("interleave without follower".to_string())
                })?;
                let local: Vec<u64> = frames
                    .iter()
                    .filter(|&&f| f > cum_snapshots && f <= cum_snapshots + spec.snapshots)
                    .map(|&f| f - cum_snapshots)
                    .collect();
                if !local.is_empty() {
                    let source = TrajSource {
                        name: traj_parts
                            .last()
                            .map(|p| p.name.clone())
                            .ok_or_else(|| {
                                GridError::NullReference(
                                    "interleaved analysis without a trajectory part"
                                        .to_string(),
                                )
                            })?,
                        subdirectory: Some(self.intermediate_dir()),
                        parent: Some(id),
                        temporary: true,
                    };
                    self.analysis_batches(
                        an,
                        source,
                        &local,
                        cum_snapshots,
                        Some(id),
                        &mut analysis_parts,
                    )?;
                }
            }

            prev_md = Some(id);
            cum_snapshots += spec.snapshots;
        }

        let mut groups = Vec::new();
        for (param, parts) in [("traj", traj_parts), ("log", log_parts)] {
            if let (Some(logical), false) = (cmd.file(param), parts.is_empty()) {
                groups.push((param.to_string(), logical, parts));
            }
        }
        let mut tail = prev_md;
        if !groups.is_empty() {
            tail = Some(self.add_recombine(AppKind::RecombineSimulate, prev_md, groups));
        }

        if interleave {
            let an = follower.ok_or_else(|| {
                GridError::NullReference("interleave without follower".to_string())
            })?;
            tail = Some(self.finish_analysis(an, analysis_parts, tail)?);
        }

        self.tail = tail;
        Ok(interleave)
    }

    fn single_simulation_node(
        &mut self,
        cmd: &ScriptCommand,
        spec: &SegmentSpec,
    ) -> Result<LocalId> {
        let id = self.batch.next_id();
        let mut args = Vec::new();
        for (name, value) in &cmd.params {
            let arg = match value {
                ParamValue::File(idx) => {
                    let idx = if self.is_output(*idx) {
                        *idx
                    } else {
                        self.resolve_input(*idx)?
                    };
                    NodeArg::file(name.clone(), idx)
                }
                ParamValue::Literal(s) => NodeArg::literal(name.clone(), s.clone()),
            };
            args.push(arg);
        }
        self.batch.nodes.push(JobNode {
            local_id: id,
            app: AppKind::Simulate,
            prereq: self.tail,
            args,
            estimate: spec.estimate,
            snapshot_offset: 0,
        });
        Ok(id)
    }

    // ---- analysis expansion ------------------------------------------

    fn expand_analysis(&mut self, cmd: &ScriptCommand) -> Result<()> {
        let _config = self.require_file(cmd, "config")?;
        self.require_file(cmd, "topology")?;
        let traj_idx = self.require_file(cmd, "traj")?;

        let desc = self
            .batch
            .registry
            .get(traj_idx)
            .ok_or_else(|| {
                GridError::NullReference(format!("file index {traj_idx} out of range"))
            })?
            .clone();
        let parent = self.producer_of(&desc.name);
        let source = TrajSource {
            name: desc.name.clone(),
            subdirectory: desc.subdirectory.clone(),
            parent,
            temporary: desc.kind.is_temporary(),
        };

        let frames = match cmd.literal("frames") {
            Some(spec) => parse_frame_list(spec)?,
            None => Vec::new(),
        };

        let mut parts = Vec::new();
        if frames.is_empty() {
            // unknown snapshot count, analyse the trajectory whole
            self.analysis_batches(cmd, source, &[], 0, self.tail, &mut parts)?;
        } else {
            self.analysis_batches(cmd, source, &frames, 0, self.tail, &mut parts)?;
        }
        self.tail = Some(self.finish_analysis(cmd, parts, self.tail)?);
        Ok(())
    }

    /// Create the analyze nodes for one trajectory source, one node per
    /// snapshot batch, fanning out from `prereq`.
    fn analysis_batches(
        &mut self,
        cmd: &ScriptCommand,
        source: TrajSource,
        frames: &[u64],
        global_offset: u64,
        prereq: Option<LocalId>,
        parts: &mut Vec<Part>,
    ) -> Result<()> {
        let out_idx = self.require_file(cmd, "out")?;
        let out_name = self.name_of(out_idx);
        let oversized = !source.temporary && self.is_oversized(&source)?;

        let batches: Vec<Vec<u64>> = if frames.is_empty() {
            vec![Vec::new()]
        } else {
            partition_frames(frames, self.cfg.limits.max_batch_snapshots)
        };

        debug!(
            traj = %source.name,
            batches = batches.len(),
            oversized,
            "expanding analysis command"
        );

        for batch_frames in &batches {
            let batch_offset = batch_frames.first().map(|f| f - 1).unwrap_or(0);
            let offset = global_offset + batch_offset;

            let mut analyze_prereq = prereq;
            let mut traj_source = source.clone();
            let mut extracted: Option<(LocalId, FileIndex)> = None;

            if oversized && !batch_frames.is_empty() {
                let (extract_id, frames_idx) =
                    self.add_extract(cmd, &source, batch_frames, prereq)?;
                let frames_name = self.name_of(frames_idx);
                traj_source = TrajSource {
                    name: frames_name,
                    subdirectory: Some(self.intermediate_dir()),
                    parent: Some(extract_id),
                    temporary: true,
                };
                analyze_prereq = Some(extract_id);
                extracted = Some((extract_id, frames_idx));
            }

            let id = self.batch.next_id();
            let mut args = Vec::new();
            for (name, value) in &cmd.params {
                match (name.as_str(), value) {
                    ("traj", ParamValue::File(_)) => {
                        let mut file =
                            FileDescriptor::new(&traj_source.name, input_kind(&traj_source));
                        file = file.with_alias(base_name(&source.name));
                        if let Some(dir) = &traj_source.subdirectory {
                            file = file.with_subdirectory(dir.clone());
                        }
                        if let Some(parent) = traj_source.parent {
                            file = file.with_parent(parent);
                        }
                        let idx = self.batch.registry.insert(file);
                        args.push(NodeArg::file("traj", idx));
                    }
                    ("out", ParamValue::File(_)) => {
                        let piece = part_name(&out_name, id);
                        let idx = self.batch.registry.insert(
                            FileDescriptor::new(&piece, FileKind::TemporaryOutput)
                                .with_alias(base_name(&out_name))
                                .with_subdirectory(self.intermediate_dir()),
                        );
                        args.push(NodeArg::file("out", idx));
                        parts.push(Part {
                            producer: id,
                            offset,
                            name: piece,
                        });
                    }
                    ("frames", _) => {
                        if !batch_frames.is_empty() {
                            // renumbered relative to the batch offset
                            args.push(NodeArg::literal(
                                "frames",
                                render_frame_range(1, batch_frames.len() as u64),
                            ));
                        }
                    }
                    (_, ParamValue::File(idx)) => {
                        args.push(NodeArg::file(name.clone(), self.resolve_input(*idx)?));
                    }
                    (_, ParamValue::Literal(s)) => {
                        args.push(NodeArg::literal(name.clone(), s.clone()));
                    }
                }
            }

            self.batch.nodes.push(JobNode {
                local_id: id,
                app: AppKind::Analyze,
                prereq: analyze_prereq,
                args,
                estimate: segment::estimate_units(0.0, 0, 0),
                snapshot_offset: offset,
            });

            if let Some((_, frames_idx)) = extracted {
                self.add_cleanup(id, frames_idx);
            }
        }
        Ok(())
    }

    /// Close out an analysis command: one part keeps the logical output
    /// name, several parts get a recombination node.
    fn finish_analysis(
        &mut self,
        cmd: &ScriptCommand,
        mut parts: Vec<Part>,
        prereq: Option<LocalId>,
    ) -> Result<LocalId> {
        let out_idx = self.require_file(cmd, "out")?;
        match parts.len() {
            0 => Err(GridError::InvalidInputParameter(
                "analysis command produced no work".to_string(),
            )),
            1 => {
                // promote the single part back to the logical output
                let part = parts.remove(0);
                let logical = self
                    .batch
                    .registry
                    .get(out_idx)
                    .map(|d| (d.name.clone(), d.kind))
                    .ok_or_else(|| {
                        GridError::NullReference(format!(
                            "file index {out_idx} out of range"
                        ))
                    })?;
                let node_idx = self
                    .batch
                    .node(part.producer)
                    .and_then(|n| n.file_arg("out"))
                    .ok_or_else(|| {
                        GridError::NullReference(format!(
                            "analysis node {} lost its output",
                            part.producer
                        ))
                    })?;
                if let Some(desc) = self.batch.registry.get_mut(node_idx) {
                    desc.name = logical.0.clone();
                    desc.alias = logical.0;
                    desc.kind = logical.1;
                    desc.subdirectory = None;
                }
                Ok(part.producer)
            }
            _ => Ok(self.add_recombine(
                AppKind::RecombineAnalyze,
                prereq,
                vec![("out".to_string(), out_idx, parts)],
            )),
        }
    }

    // ---- internal nodes ----------------------------------------------

    fn add_recombine(
        &mut self,
        app: AppKind,
        prereq: Option<LocalId>,
        groups: Vec<(String, FileIndex, Vec<Part>)>,
    ) -> LocalId {
        let id = self.batch.next_id();
        let mut args = Vec::new();
        for (param, logical, mut parts) in groups {
            parts.sort_by_key(|p| (p.offset, p.producer));
            let logical_name = self.name_of(logical);
            for part in &parts {
                let idx = self.batch.registry.insert(
                    FileDescriptor::new(&part.name, FileKind::TemporaryInput)
                        .with_alias(base_name(&logical_name))
                        .with_subdirectory(self.intermediate_dir())
                        .with_parent(part.producer),
                );
                args.push(NodeArg::file(format!("{param}_part"), idx));
            }
            args.push(NodeArg::file(param, logical));
        }
        self.batch.nodes.push(JobNode {
            local_id: id,
            app,
            prereq,
            args,
            estimate: 0.0,
            snapshot_offset: 0,
        });
        id
    }

    fn add_extract(
        &mut self,
        cmd: &ScriptCommand,
        source: &TrajSource,
        frames: &[u64],
        prereq: Option<LocalId>,
    ) -> Result<(LocalId, FileIndex)> {
        let id = self.batch.next_id();
        let topology_idx = self.require_file(cmd, "topology")?;
        let (atoms, boxed) = {
            let params = self
                .require_file(cmd, "config")
                .and_then(|idx| self.load_parameters(idx))?;
            (
                self.resolve_atom_count(&params, topology_idx)?,
                params.get_i64("box").unwrap_or(0) != 0,
            )
        };

        let traj = self.batch.registry.insert({
            let mut d = FileDescriptor::new(&source.name, input_kind(source));
            if let Some(dir) = &source.subdirectory {
                d = d.with_subdirectory(dir.clone());
            }
            if let Some(parent) = source.parent {
                d = d.with_parent(parent);
            }
            d
        });
        let frames_idx = self.batch.registry.insert(
            FileDescriptor::new(
                part_name(&format!("{}.frames", source.name), id),
                FileKind::TemporaryOutput,
            )
            .with_subdirectory(self.intermediate_dir()),
        );

        let frame_list = frames
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut args = vec![
            NodeArg::file("traj", traj),
            NodeArg::file("out", frames_idx),
            NodeArg::literal("frames", frame_list),
            NodeArg::literal("atoms", atoms.to_string()),
        ];
        if boxed {
            // one extra line per frame in the trajectory layout
            args.push(NodeArg::literal("box", "1"));
        }
        self.batch.nodes.push(JobNode {
            local_id: id,
            app: AppKind::ExtractFrames,
            prereq,
            args,
            estimate: 0.0,
            snapshot_offset: 0,
        });
        Ok((id, frames_idx))
    }

    fn add_cleanup(&mut self, after: LocalId, frames_idx: FileIndex) -> LocalId {
        let id = self.batch.next_id();
        let desc = self
            .batch
            .registry
            .get(frames_idx)
            .cloned()
            .unwrap_or_else(|| FileDescriptor::new("", FileKind::TemporaryInput));
        let target = self.batch.registry.insert(
            FileDescriptor::new(&desc.name, FileKind::TemporaryInput)
                .with_subdirectory(desc.subdirectory.clone().unwrap_or_default())
                .with_parent(after),
        );
        self.batch.nodes.push(JobNode {
            local_id: id,
            app: AppKind::CleanupFrames,
            prereq: Some(after),
            args: vec![NodeArg::file("target", target)],
            estimate: 0.0,
            snapshot_offset: 0,
        });
        id
    }

    // ---- shared helpers ----------------------------------------------

    fn require_file(&self, cmd: &ScriptCommand, name: &str) -> Result<FileIndex> {
        cmd.file(name).ok_or_else(|| {
            GridError::MissingInputFile(format!(
                "{} command needs a -{name} file",
                match cmd.app {
                    ScriptApp::Simulate => "simulate",
                    ScriptApp::Analyze => "analyze",
                }
            ))
        })
    }

    fn name_of(&self, idx: FileIndex) -> String {
        self.batch
            .registry
            .get(idx)
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    fn is_output(&self, idx: FileIndex) -> bool {
        self.batch
            .registry
            .get(idx)
            .map(|d| d.kind.is_output())
            .unwrap_or(false)
    }

    fn intermediate_dir(&self) -> String {
        self.cfg.dirs.intermediate.display().to_string()
    }

    /// Latest node producing a file of this name, if any.
    fn producer_of(&self, name: &str) -> Option<LocalId> {
        for node in self.batch.nodes.iter().rev() {
            for idx in node.files() {
                if let Some(d) = self.batch.registry.get(idx) {
                    if d.kind.is_output() && d.name == name {
                        return Some(node.local_id);
                    }
                }
            }
        }
        None
    }

    /// Re-register an input that an earlier node produces so the consumer
    /// carries the producer link; inputs nothing produces must already
    /// exist on disk.
    fn resolve_input(&mut self, idx: FileIndex) -> Result<FileIndex> {
        let Some(desc) = self.batch.registry.get(idx).cloned() else {
            return Ok(idx);
        };
        if let Some(parent) = self.producer_of(&desc.name) {
            let kind = if desc.kind.is_temporary() {
                FileKind::TemporaryInput
            } else {
                FileKind::PermanentInput
            };
            let mut file = FileDescriptor::new(&desc.name, kind)
                .with_alias(desc.alias)
                .with_parent(parent);
            if let Some(dir) = desc.subdirectory {
                file = file.with_subdirectory(dir);
            }
            return Ok(self.batch.registry.insert(file));
        }
        if !desc.kind.is_output() && !Path::new(&desc.relative_path()).exists() {
            return Err(GridError::MissingInputFile(desc.relative_path()));
        }
        Ok(idx)
    }

    fn load_parameters(&self, config_idx: FileIndex) -> Result<ParameterSet> {
        let desc = self.batch.registry.get(config_idx).ok_or_else(|| {
            GridError::NullReference(format!("file index {config_idx} out of range"))
        })?;
        let path = desc.relative_path();
        let text = std::fs::read_to_string(&path)
            .map_err(|_| GridError::MissingInputFile(path.clone()))?;
        parse_parameter_set(&text)
    }

    /// Atom count from the `atoms` parameter when given, otherwise from
    /// the leading count in the topology file.
    fn resolve_atom_count(
        &self,
        params: &ParameterSet,
        topology_idx: FileIndex,
    ) -> Result<u64> {
        if let Some(n) = params.get_i64("atoms") {
            if n <= 0 {
                return Err(GridError::InvalidInputParameter(format!(
                    "atom count must be positive, got {n}"
                )));
            }
            return Ok(n as u64);
        }
        let desc = self.batch.registry.get(topology_idx).ok_or_else(|| {
            GridError::NullReference(format!("file index {topology_idx} out of range"))
        })?;
        let path = desc.relative_path();
        let text = std::fs::read_to_string(&path)
            .map_err(|_| GridError::MissingInputFile(path.clone()))?;
        text.split_whitespace()
            .next()
            .and_then(|tok| tok.parse::<u64>().ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                GridError::InvalidInputParameter(format!(
                    "cannot read an atom count from {path}"
                ))
            })
    }

    fn write_segment_parameters(
        &mut self,
        params: &ParameterSet,
        spec: &SegmentSpec,
        config_idx: FileIndex,
        id: LocalId,
    ) -> Result<FileIndex> {
        let mut seg = params.clone();
        segment::apply_segment(&mut seg, spec);

        let config_name = self.name_of(config_idx);
        let name = part_name(&config_name, id);
        let dir = PathBuf::from(self.intermediate_dir());
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(&name), seg.render())?;

        Ok(self.batch.registry.insert(
            FileDescriptor::new(&name, FileKind::TemporaryInput)
                .with_alias(base_name(&config_name))
                .with_subdirectory(self.intermediate_dir()),
        ))
    }

    fn copy_passthrough(&mut self, cmd: &ScriptCommand, args: &mut Vec<NodeArg>) -> Result<()> {
        for (name, value) in &cmd.params {
            if matches!(
                name.as_str(),
                "config" | "coords" | "topology" | "traj" | "log" | "restart" | "frames"
            ) {
                continue;
            }
            match value {
                ParamValue::File(idx) => {
                    let idx = self.resolve_input(*idx)?;
                    args.push(NodeArg::file(name.clone(), idx));
                }
                ParamValue::Literal(s) => args.push(NodeArg::literal(name.clone(), s.clone())),
            }
        }
        Ok(())
    }

    fn is_oversized(&self, source: &TrajSource) -> Result<bool> {
        let path = match &source.subdirectory {
            Some(dir) => PathBuf::from(dir).join(&source.name),
            None => PathBuf::from(&source.name),
        };
        let limit = self.cfg.limits.max_stage_file_mb * 1024 * 1024;
        Ok(std::fs::metadata(&path)
            .map(|m| m.len() > limit)
            .unwrap_or(false))
    }
}

fn input_kind(source: &TrajSource) -> FileKind {
    if source.temporary {
        FileKind::TemporaryInput
    } else {
        FileKind::PermanentInput
    }
}

fn base_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}

/// Per-node piece of a logical output. Pieces live in the intermediate
/// directory, so only the base name of the logical file is kept.
fn part_name(logical: &str, id: LocalId) -> String {
    let base = Path::new(logical)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(logical);
    format!("{base}_{id}")
}

fn render_frame_range(first: u64, count: u64) -> String {
    if count == 1 {
        first.to_string()
    } else {
        format!("{first}-{}", first + count - 1)
    }
}

/// Parse a one-indexed frame selection like `1-50` or `3,7,9-12`.
pub fn parse_frame_list(spec: &str) -> Result<Vec<u64>> {
    let mut frames = Vec::new();
    for piece in spec.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if let Some((a, b)) = piece.split_once('-') {
            let a: u64 = parse_frame(a)?;
            let b: u64 = parse_frame(b)?;
            if a > b {
                return Err(GridError::InvalidInputParameter(format!(
                    "descending frame range '{piece}'"
                )));
            }
            frames.extend(a..=b);
        } else {
            frames.push(parse_frame(piece)?);
        }
    }
    if frames.is_empty() {
        return Err(GridError::InvalidInputParameter(format!(
            "empty frame selection '{spec}'"
        )));
    }
    frames.sort_unstable();
    frames.dedup();
    Ok(frames)
}

fn parse_frame(s: &str) -> Result<u64> {
    let n: u64 = s.trim().parse().map_err(|_| {
        GridError::InvalidInputParameter(format!("'{s}' is not a frame number"))
    })?;
    if n == 0 {
        return Err(GridError::InvalidInputParameter(
            "frames are numbered from 1".to_string(),
        ));
    }
    Ok(n)
}

/// Split an ascending frame list into runs of at most `max` consecutive
/// frames; a gap always starts a new batch.
pub fn partition_frames(frames: &[u64], max: u64) -> Vec<Vec<u64>> {
    let mut batches: Vec<Vec<u64>> = Vec::new();
    for &f in frames {
        let start_new = match batches.last().and_then(|b| b.last()) {
            Some(&last) => f != last + 1 || batches.last().map(Vec::len).unwrap_or(0) as u64 >= max,
            None => true,
        };
        if start_new {
            batches.push(Vec::new());
        }
        if let Some(batch) = batches.last_mut() {
            batch.push(f);
        }
    }
    batches
}
