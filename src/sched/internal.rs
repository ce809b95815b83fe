// src/sched/internal.rs

//! In-process execution of the bookkeeping apps.
//!
//! Recombination, frame extraction and cleanup touch only local files, so
//! dispatching them to the grid would cost more than running them. The
//! scheduler executes them inline the moment they become ready.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::errors::{GridError, Result};
use crate::graph::AppKind;
use crate::store::{PersistedFile, PersistedJob};

/// Run one internal job against its file rows.
pub fn run(job: &PersistedJob, files: &[PersistedFile]) -> Result<()> {
    info!(job = job.id, app = job.app.name(), "running internal job");
    match job.app {
        AppKind::RecombineSimulate | AppKind::RecombineAnalyze => recombine(files),
        AppKind::ExtractFrames => extract_frames(job, files),
        AppKind::CleanupFrames => cleanup(files),
        AppKind::Simulate | AppKind::Analyze => Err(GridError::InvalidAppId(format!(
            "{} is not an internal application",
            job.app.name()
        ))),
    }
}

/// Parse pre-rendered literal arguments back into name/value pairs.
pub fn parse_arguments(rendered: &str) -> Vec<(String, String)> {
    let mut args = Vec::new();
    let mut tokens = rendered.split_whitespace();
    while let Some(token) = tokens.next() {
        if let Some(name) = token.strip_prefix('-') {
            if let Some(value) = tokens.next() {
                args.push((name.to_string(), value.to_string()));
            }
        }
    }
    args
}

fn argument<'a>(args: &'a [(String, String)], name: &str) -> Option<&'a str> {
    args.iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Concatenate the `<param>_part` inputs of each logical output, in row
/// order, which preserves the snapshot ordering chosen at build time.
fn recombine(files: &[PersistedFile]) -> Result<()> {
    let outputs: Vec<&PersistedFile> = files
        .iter()
        .filter(|f| f.kind.is_output() && !f.param.ends_with("_part"))
        .collect();

    for output in outputs {
        let parts: Vec<&PersistedFile> = files
            .iter()
            .filter(|f| f.param == format!("{}_part", output.param))
            .collect();
        if parts.is_empty() {
            return Err(GridError::MissingInputFile(format!(
                "recombination of {} has no input parts",
                output.name
            )));
        }

        // Trajectory pieces each start with a copy of the header line;
        // only the first one's survives.
        let trajectory = output.alias.contains("traj");

        let mut out = fs::File::create(output.relative_path())?;
        for (i, part) in parts.iter().enumerate() {
            let path = part.relative_path();
            let text = fs::read_to_string(&path)
                .map_err(|_| GridError::MissingInputFile(path.clone()))?;
            let body = if trajectory && i > 0 {
                match text.split_once('\n') {
                    Some((_, rest)) => rest,
                    None => "",
                }
            } else {
                text.as_str()
            };
            out.write_all(body.as_bytes())?;
            if !body.is_empty() && !body.ends_with('\n') {
                out.write_all(b"\n")?;
            }
        }
        debug!(output = %output.name, "recombined output");
    }
    Ok(())
}

/// Copy the selected frames of a trajectory into a small staging file.
///
/// Trajectory layout: one header line, then each frame spans
/// `ceil(3 * atoms / 10)` coordinate lines plus one box line when the run
/// recorded a periodic box.
fn extract_frames(job: &PersistedJob, files: &[PersistedFile]) -> Result<()> {
    let args = parse_arguments(&job.arguments);
    let atoms: u64 = argument(&args, "atoms")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            GridError::InvalidInputParameter(
                "frame extraction needs an atom count".to_string(),
            )
        })?;
    let has_box = argument(&args, "box")
        .map(|v| v != "0")
        .unwrap_or(false);
    // frames are one-indexed; a stray zero would underflow below
    let frames: Vec<u64> = argument(&args, "frames")
        .map(|v| {
            v.split(',')
                .filter_map(|s| s.trim().parse().ok())
                .filter(|&f| f >= 1)
                .collect()
        })
        .unwrap_or_default();
    if frames.is_empty() {
        return Err(GridError::InvalidInputParameter(
            "frame extraction with an empty frame list".to_string(),
        ));
    }

    let input = files
        .iter()
        .find(|f| f.param == "traj")
        .ok_or_else(|| GridError::MissingInputFile("trajectory to extract".to_string()))?;
    let output = files
        .iter()
        .find(|f| f.param == "out")
        .ok_or_else(|| GridError::MissingInputFile("extraction output".to_string()))?;

    let text = fs::read_to_string(input.relative_path())
        .map_err(|_| GridError::MissingInputFile(input.relative_path()))?;
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Err(GridError::InvalidInputParameter(format!(
            "{} is empty",
            input.name
        )));
    }

    let per_frame = (3 * atoms).div_ceil(10) as usize + usize::from(has_box);

    let mut out = String::new();
    out.push_str(lines[0]);
    out.push('\n');
    for frame in &frames {
        let start = 1 + (*frame as usize - 1) * per_frame;
        let end = start + per_frame;
        if end > lines.len() {
            return Err(GridError::InvalidInputParameter(format!(
                "frame {frame} is past the end of {}",
                input.name
            )));
        }
        for line in &lines[start..end] {
            out.push_str(line);
            out.push('\n');
        }
    }
    fs::write(output.relative_path(), out)?;
    debug!(
        job = job.id,
        frames = frames.len(),
        output = %output.name,
        "extracted frames"
    );
    Ok(())
}

/// Remove staged frame files once their analysis is done.
fn cleanup(files: &[PersistedFile]) -> Result<()> {
    for file in files.iter().filter(|f| f.param == "target") {
        let path = file.relative_path();
        match fs::remove_file(&path) {
            Ok(()) => debug!(file = %path, "removed staged frames"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(file = %path, "staged frames already gone")
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Move a batch's temporary files into an archive directory. Files that
/// never materialised (invalidated producers) are skipped.
pub fn archive_temporaries(
    files: &[PersistedFile],
    archive_root: &Path,
    batch: i64,
) -> Result<usize> {
    let mut paths: Vec<String> = files
        .iter()
        .filter(|f| f.kind.is_temporary())
        .map(PersistedFile::relative_path)
        .collect();
    paths.sort();
    paths.dedup();
    if paths.is_empty() {
        return Ok(0);
    }

    let dest_dir = archive_root.join(format!("raw_data_{batch}"));
    fs::create_dir_all(&dest_dir)?;

    let mut moved = 0;
    for path in paths {
        let src = Path::new(&path);
        let Some(name) = src.file_name() else {
            continue;
        };
        match fs::rename(src, dest_dir.join(name)) {
            Ok(()) => moved += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    info!(batch, moved, dest = %dest_dir.display(), "archived temporary files");
    Ok(moved)
}
