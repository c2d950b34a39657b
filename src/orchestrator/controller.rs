//! Run lifecycle controller.
//!
//! Accepts form submissions, runs at most one workflow at a time and emits
//! events for presentation layers.

use super::post_process::{process_run_completion, PostRunOptions};
use crate::engine::PipelineEngine;
use crate::error::PipelineResult;
use crate::model::{InfoEvent, RunConfig, RunEvent, RunResult};
use crate::TRACING_TARGET_CONTROLLER;
use anyhow::Result;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Submit(Box<RunConfig>),
    Quit,
}

/// Internal handle for a running workflow.
struct RunCtx {
    handle: Option<tokio::task::JoinHandle<PipelineResult<RunResult>>>,
}

/// Start a workflow on a blocking thread; its steps stay strictly sequential.
fn start_run(cfg: RunConfig, event_tx: UnboundedSender<RunEvent>) -> RunCtx {
    let engine = PipelineEngine::new(cfg);
    let handle = tokio::task::spawn_blocking(move || engine.run(&event_tx));
    RunCtx {
        handle: Some(handle),
    }
}

/// Serve UI commands until quit, emitting run events back to presentation layers.
pub(crate) async fn run_controller(
    opts: &PostRunOptions,
    event_tx: UnboundedSender<RunEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut run_ctx: Option<RunCtx> = None;
    let mut quit_pending = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Submit(cfg)) => {
                        if run_ctx.is_some() {
                            let _ = event_tx.send(RunEvent::Info(InfoEvent::RunBusy));
                        } else {
                            tracing::info!(
                                target: TRACING_TARGET_CONTROLLER,
                                workflow = %cfg.workflow(),
                                "submission accepted"
                            );
                            run_ctx = Some(start_run(*cfg, event_tx.clone()));
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Runs cannot be cancelled, so quitting waits for the active one.
                        if run_ctx.is_none() {
                            break;
                        }
                        quit_pending = true;
                        let _ = event_tx.send(RunEvent::Info(InfoEvent::WaitingForRun));
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    run_ctx = None;
                    match join_res {
                        Ok(Ok(r)) => {
                            let processed = process_run_completion(opts, r);
                            for msg in processed.messages {
                                let _ = event_tx.send(RunEvent::Info(InfoEvent::Message(msg)));
                            }
                            let _ = event_tx.send(RunEvent::RunCompleted {
                                result: Box::new(processed.result),
                            });
                        }
                        Ok(Err(e)) => {
                            let msg = format!("{:#}", anyhow::Error::from(e));
                            tracing::warn!(
                                target: TRACING_TARGET_CONTROLLER,
                                error = %msg,
                                "run failed"
                            );
                            let _ = event_tx.send(RunEvent::Info(InfoEvent::RunFailed(msg)));
                        }
                        Err(e) => {
                            let _ = event_tx.send(RunEvent::Info(InfoEvent::RunFailed(format!(
                                "run task join failed: {e}"
                            ))));
                        }
                    }
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::invoke::ChildOutput;
    use std::path::Path;
    use tokio::sync::mpsc;

    fn config(dir: &Path, body: &str) -> RunConfig {
        let stem = "data-XRAY-Classification_ON_RAW-WITHOUT-M-estimator";
        std::fs::write(
            dir.join(format!("{stem}.Rmd")),
            format!("```{{r}}\n{body}\n```\n"),
        )
        .unwrap();
        let input = dir.join("upload.csv");
        std::fs::write(&input, "a,b\n1,2\n").unwrap();
        RunConfig {
            interpreter: "sh".into(),
            workdir: dir.to_path_buf(),
            input,
            robust_estimator: false,
            imputation: false,
            weight_cutoff: 0.65,
            redshift_cutoff: 3.0,
            child_output: ChildOutput::AppendTo(dir.join("child.log")),
        }
    }

    async fn drive(cmds: Vec<UiCommand>) -> Vec<RunEvent> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        for c in cmds {
            cmd_tx.send(c).unwrap();
        }
        run_controller(&PostRunOptions::default(), event_tx, cmd_rx)
            .await
            .unwrap();
        let mut events = Vec::new();
        while let Ok(ev) = event_rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn quit_waits_for_submitted_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "sleep 0.2; touch finished");
        let events = drive(vec![UiCommand::Submit(Box::new(cfg)), UiCommand::Quit]).await;

        assert!(dir.path().join("finished").exists());
        assert!(events
            .iter()
            .any(|e| matches!(e, RunEvent::Info(InfoEvent::WaitingForRun))));
        assert!(matches!(events.last(), Some(RunEvent::RunCompleted { .. })));
    }

    #[tokio::test]
    async fn second_submission_is_refused_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "sleep 0.2");
        let events = drive(vec![
            UiCommand::Submit(Box::new(cfg.clone())),
            UiCommand::Submit(Box::new(cfg)),
            UiCommand::Quit,
        ])
        .await;

        assert!(events
            .iter()
            .any(|e| matches!(e, RunEvent::Info(InfoEvent::RunBusy))));
        let completed = events
            .iter()
            .filter(|e| matches!(e, RunEvent::RunCompleted { .. }))
            .count();
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn failed_run_reports_external_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "exit 1");
        let events = drive(vec![UiCommand::Submit(Box::new(cfg)), UiCommand::Quit]).await;

        let failure = events.iter().find_map(|e| match e {
            RunEvent::Info(InfoEvent::RunFailed(msg)) => Some(msg.clone()),
            _ => None,
        });
        let failure = failure.expect("run should fail");
        assert!(failure.contains("exited with status 1"), "{failure}");
        assert!(!events
            .iter()
            .any(|e| matches!(e, RunEvent::RunCompleted { .. })));
    }
}
