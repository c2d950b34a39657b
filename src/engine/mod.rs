pub mod extract;
pub mod invoke;
pub mod plots;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{RunConfig, RunEvent, RunResult, StepRecord};
use crate::TRACING_TARGET_ENGINE;
use invoke::Invocation;
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc;

/// Runs one workflow end to end: stage input, then extract and invoke each
/// step in order, then list the plots.
///
/// Everything here blocks; callers on an async runtime should move it onto a
/// blocking thread.
pub struct PipelineEngine {
    cfg: RunConfig,
}

impl PipelineEngine {
    pub fn new(cfg: RunConfig) -> Self {
        Self { cfg }
    }

    pub fn run(self, event_tx: &mpsc::UnboundedSender<RunEvent>) -> PipelineResult<RunResult> {
        let cfg = &self.cfg;
        let workflow = cfg.workflow();
        let steps = workflow.steps();
        let run_start = Instant::now();

        tracing::info!(
            target: TRACING_TARGET_ENGINE,
            %workflow,
            steps = steps.len(),
            workdir = %cfg.workdir.display(),
            "starting workflow"
        );

        let staged = crate::storage::stage_input(&cfg.input, &cfg.staged_input())?;
        let _ = event_tx.send(RunEvent::InputStaged { path: staged });

        let mut records = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let script_name = step.script();
            let _ = event_tx.send(RunEvent::StepStarted {
                index,
                total: steps.len(),
                script: script_name.clone(),
            });
            let step_start = Instant::now();

            let conversion = extract::convert_document(
                &cfg.workdir.join(step.document()),
                &cfg.workdir.join(&script_name),
            )?;
            let _ = event_tx.send(RunEvent::ScriptExtracted {
                index,
                chunks: conversion.chunks,
                document_found: conversion.document_found,
            });

            let args = step.invocation_args(cfg);
            // The child runs inside the workdir, so the script is named relative to it.
            let invocation = Invocation {
                interpreter: &cfg.interpreter,
                script: Path::new(&script_name),
                args: &args,
                current_dir: Some(&cfg.workdir),
                output: &cfg.child_output,
            };
            let command = invocation.command_line();
            invocation
                .run()
                .map_err(|source| {
                    tracing::warn!(
                        target: TRACING_TARGET_ENGINE,
                        step = index + 1,
                        script = %script_name,
                        code = ?source.exit_code(),
                        "step failed, aborting workflow"
                    );
                    PipelineError::Invoke {
                        step: index + 1,
                        script: script_name.clone(),
                        source,
                    }
                })?;

            let elapsed = step_start.elapsed();
            let _ = event_tx.send(RunEvent::StepFinished { index, elapsed });
            records.push(StepRecord {
                document: step.document(),
                script: script_name,
                chunks: conversion.chunks,
                command,
                elapsed,
            });
        }

        let plot_dir = cfg.workdir.join(workflow.plot_dir());
        let plots = plots::list_plots(&plot_dir);
        tracing::info!(
            target: TRACING_TARGET_ENGINE,
            plots = plots.len(),
            dir = %plot_dir.display(),
            "workflow finished"
        );

        Ok(RunResult {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            workflow,
            config: self.cfg.clone(),
            steps: records,
            plot_dir,
            plots,
            elapsed: run_start.elapsed(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::invoke::ChildOutput;
    use crate::error::InvokeError;
    use crate::model::{Workflow, DEFAULT_REDSHIFT_CUTOFF, DEFAULT_WEIGHT_CUTOFF};
    use std::path::PathBuf;

    /// Write `<stem>.Rmd` whose single chunk is shell code; `sh` stands in for Rscript.
    fn write_doc(dir: &Path, stem: &str, body: &str) {
        let doc = format!("# {stem}\n\nNarrative.\n\n```{{r run}}\n{body}\n```\n");
        std::fs::write(dir.join(format!("{stem}.Rmd")), doc).unwrap();
    }

    fn config(dir: &Path, robust: bool, mice: bool) -> RunConfig {
        let input = dir.join("upload.csv");
        std::fs::write(&input, "redshift,flux\n2.1,0.4\n").unwrap();
        RunConfig {
            interpreter: PathBuf::from("sh"),
            workdir: dir.to_path_buf(),
            input,
            robust_estimator: robust,
            imputation: mice,
            weight_cutoff: DEFAULT_WEIGHT_CUTOFF,
            redshift_cutoff: DEFAULT_REDSHIFT_CUTOFF,
            child_output: ChildOutput::AppendTo(dir.join("child.log")),
        }
    }

    #[test]
    fn raw_workflow_runs_and_lists_plots() {
        let dir = tempfile::tempdir().unwrap();
        let plot_dir = Workflow::RawNoEstimator.plot_dir().display().to_string();
        write_doc(
            dir.path(),
            "data-XRAY-Classification_ON_RAW-WITHOUT-M-estimator",
            &format!(
                "printf '%s\\n' \"$@\" > args.txt\nmkdir -p '{plot_dir}'\n\
                 touch '{plot_dir}/ROC.png' '{plot_dir}/AlgoRiskHisto.png' '{plot_dir}/log.txt'"
            ),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = PipelineEngine::new(config(dir.path(), false, false))
            .run(&tx)
            .unwrap();

        assert_eq!(result.workflow, Workflow::RawNoEstimator);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].chunks, 1);
        assert_eq!(
            result.steps[0].command,
            vec![
                "sh",
                "data-XRAY-Classification_ON_RAW-WITHOUT-M-estimator.R",
                "training_data.csv",
                "3.0"
            ]
        );
        let names: Vec<String> = result.plots.iter().map(|p| p.file_name()).collect();
        assert_eq!(names, vec!["ROC.png"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("args.txt")).unwrap(),
            "training_data.csv\n3.0\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("training_data.csv")).unwrap(),
            "redshift,flux\n2.1,0.4\n"
        );

        drop(tx);
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert!(matches!(events[0], RunEvent::InputStaged { .. }));
        assert!(matches!(
            events.last(),
            Some(RunEvent::StepFinished { index: 0, .. })
        ));
    }

    #[test]
    fn steps_run_in_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        for step in Workflow::MiceWithEstimator.steps() {
            write_doc(
                dir.path(),
                step.stem,
                &format!("echo '{} '\"$*\" >> order.txt", step.stem),
            );
        }

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = PipelineEngine::new(config(dir.path(), true, true))
            .run(&tx)
            .unwrap();
        assert!(result.plots.is_empty());

        let order = std::fs::read_to_string(dir.path().join("order.txt")).unwrap();
        let lines: Vec<&str> = order.lines().collect();
        assert_eq!(
            lines,
            vec![
                "M-estimator_XRAY_ON_RAW_DATA training_data.csv 0.65",
                "MICE-Imputation_RAW-with_M-estimator training_data.csv",
                "data-XRAY-Classification_ON_MICE-RAW-WITH-M-estimator 3.0",
            ]
        );
    }

    #[test]
    fn failing_step_aborts_before_plot_listing() {
        let dir = tempfile::tempdir().unwrap();
        let steps = Workflow::MiceNoEstimator.steps();
        write_doc(dir.path(), steps[0].stem, "exit 1");
        write_doc(dir.path(), steps[1].stem, "touch second_ran");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = PipelineEngine::new(config(dir.path(), false, true))
            .run(&tx)
            .unwrap_err();

        match err {
            PipelineError::Invoke {
                step,
                source: InvokeError::Failed(e),
                ..
            } => {
                assert_eq!(step, 1);
                assert_eq!(e.code, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("second_ran").exists());

        drop(tx);
        while let Ok(ev) = rx.try_recv() {
            assert!(!matches!(ev, RunEvent::RunCompleted { .. }));
            assert!(!matches!(ev, RunEvent::StepFinished { .. }));
        }
    }

    #[test]
    fn missing_document_still_invokes_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = PipelineEngine::new(config(dir.path(), false, false))
            .run(&tx)
            .unwrap();
        assert_eq!(result.steps[0].chunks, 0);
        let script = dir
            .path()
            .join("data-XRAY-Classification_ON_RAW-WITHOUT-M-estimator.R");
        assert_eq!(std::fs::read_to_string(script).unwrap(), "");
    }

    #[test]
    fn unsupported_upload_is_rejected_before_any_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), false, false);
        cfg.input = dir.path().join("table.parquet");
        std::fs::write(&cfg.input, "x").unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = PipelineEngine::new(cfg).run(&tx).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedInput(_)));
        assert!(!dir.path().join("training_data.csv").exists());
    }
}
