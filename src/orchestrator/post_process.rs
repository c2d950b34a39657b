//! Post-run processing utilities.
//!
//! Handles JSON export and removal of generated files after a run completes.

use crate::model::RunResult;
use crate::storage;
use crate::TRACING_TARGET_CONTROLLER;
use std::path::PathBuf;

/// What to do with a successful run before presenting it.
#[derive(Debug, Clone, Default)]
pub(crate) struct PostRunOptions {
    pub export_json: Option<PathBuf>,
    pub clean_up: bool,
}

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub result: RunResult,
    pub messages: Vec<String>,
}

/// Export and clean up after a completed run. Failures become messages; the
/// run itself already succeeded.
pub(crate) fn process_run_completion(opts: &PostRunOptions, run: RunResult) -> ProcessedRun {
    let mut messages = Vec::new();

    if let Some(export_path) = opts.export_json.as_deref() {
        match storage::export_json(export_path, &run) {
            Ok(()) => messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    if opts.clean_up {
        match storage::clean_up(&storage::generated_files(&run)) {
            Ok(removed) => messages.push(format!("Removed {} generated file(s)", removed.len())),
            Err(e) => messages.push(format!("Clean-up failed: {e:#}")),
        }
    }

    for msg in &messages {
        tracing::debug!(target: TRACING_TARGET_CONTROLLER, message = %msg, "post-run");
    }

    ProcessedRun {
        result: run,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::invoke::ChildOutput;
    use crate::model::{RunConfig, StepRecord, Workflow};
    use std::time::Duration;

    fn finished_run(workdir: &std::path::Path) -> RunResult {
        RunResult {
            timestamp_utc: "2026-01-01T00:00:00Z".into(),
            workflow: Workflow::MiceNoEstimator,
            config: RunConfig {
                interpreter: "Rscript".into(),
                workdir: workdir.to_path_buf(),
                input: workdir.join("upload.csv"),
                robust_estimator: false,
                imputation: true,
                weight_cutoff: 0.65,
                redshift_cutoff: 3.0,
                child_output: ChildOutput::Inherit,
            },
            steps: Workflow::MiceNoEstimator
                .steps()
                .iter()
                .map(|s| StepRecord {
                    document: s.document(),
                    script: s.script(),
                    chunks: 1,
                    command: vec![],
                    elapsed: Duration::from_millis(5),
                })
                .collect(),
            plot_dir: workdir.join(Workflow::MiceNoEstimator.plot_dir()),
            plots: vec![],
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn exports_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let run = finished_run(dir.path());
        for f in storage::generated_files(&run) {
            std::fs::write(f, "").unwrap();
        }
        let export = dir.path().join("out/result.json");
        let opts = PostRunOptions {
            export_json: Some(export.clone()),
            clean_up: true,
        };

        let processed = process_run_completion(&opts, run);
        assert_eq!(processed.messages.len(), 2);
        assert!(processed.messages[1].contains("Removed 3"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(json["workflow"], "MiceNoEstimator");
        assert!(!dir.path().join("training_data.csv").exists());
    }

    #[test]
    fn nothing_requested_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let processed = process_run_completion(&PostRunOptions::default(), finished_run(dir.path()));
        assert!(processed.messages.is_empty());
    }
}
