//! Filesystem side effects around a run: staging the uploaded dataset,
//! exporting results and removing generated files.

use crate::error::{PipelineError, PipelineResult};
use crate::model::RunResult;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const ACCEPTED_INPUT_EXTENSIONS: [&str; 2] = ["csv", "txt"];

/// Whether `path` has one of the accepted dataset extensions.
pub fn is_accepted_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            ACCEPTED_INPUT_EXTENSIONS
                .iter()
                .any(|ok| e.eq_ignore_ascii_case(ok))
        })
        .unwrap_or(false)
}

/// Copy the uploaded dataset to `staged`, replacing any earlier upload.
pub fn stage_input(input: &Path, staged: &Path) -> PipelineResult<PathBuf> {
    if !is_accepted_input(input) {
        return Err(PipelineError::UnsupportedInput(input.to_path_buf()));
    }
    let bytes = std::fs::read(input)
        .map_err(|e| PipelineError::io(format!("read input {}", input.display()), e))?;
    std::fs::write(staged, bytes)
        .map_err(|e| PipelineError::io(format!("stage input {}", staged.display()), e))?;
    Ok(staged.to_path_buf())
}

/// Write a run result as pretty JSON.
pub fn export_json(path: &Path, result: &RunResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(result)?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Delete the given files, ignoring ones that are already gone.
/// Returns the paths that were removed.
pub fn clean_up<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for p in paths {
        let p = p.as_ref();
        match std::fs::remove_file(p) {
            Ok(()) => removed.push(p.to_path_buf()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("remove {}", p.display())),
        }
    }
    Ok(removed)
}

/// Generated scripts and the staged input of a finished run.
pub fn generated_files(result: &RunResult) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = result
        .steps
        .iter()
        .map(|s| result.config.workdir.join(&s.script))
        .collect();
    files.sort();
    files.dedup();
    files.push(result.config.staged_input());
    files
}
