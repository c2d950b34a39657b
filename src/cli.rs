use crate::engine::invoke::ChildOutput;
use crate::engine::PipelineEngine;
use crate::model::{
    RunConfig, RunEvent, RunResult, DEFAULT_REDSHIFT_CUTOFF, DEFAULT_WEIGHT_CUTOFF,
    REDSHIFT_CUTOFF_RANGE, WEIGHT_CUTOFF_RANGE,
};
use crate::orchestrator::{process_run_completion, PostRunOptions};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// Interpreter used when `--rscript` is not given.
pub fn default_interpreter() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Library/Frameworks/R.framework/Resources/bin/Rscript")
    } else {
        PathBuf::from("Rscript")
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "redshift-classifier",
    version,
    about = "Run the X-ray redshift classification R Markdown pipelines"
)]
pub struct Cli {
    /// Optical dataset to analyse (.csv or .txt)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Use the M-estimator to down-weight outliers
    #[arg(long)]
    pub m_estimator: bool,

    /// Apply MICE imputation before classification
    #[arg(long)]
    pub mice: bool,

    /// M-estimator weight cutoff (0.0 to 1.0)
    #[arg(long, default_value_t = DEFAULT_WEIGHT_CUTOFF)]
    pub weight_cutoff: f64,

    /// Redshift cutoff for classification (2.0 to 4.0)
    #[arg(long, default_value_t = DEFAULT_REDSHIFT_CUTOFF)]
    pub redshift_cutoff: f64,

    /// Path to the Rscript interpreter
    #[arg(long, default_value_os_t = default_interpreter())]
    pub rscript: PathBuf,

    /// Directory holding the .Rmd documents; scripts, staged input and plots are written here
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Print JSON result and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print progress and plot paths, then exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Export the run result as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Delete generated scripts and the staged input after a successful run
    #[arg(long)]
    pub clean_up: bool,

    /// Write Rscript output to this file in TUI mode (default: <workdir>/rscript.log)
    #[arg(long)]
    pub child_log: Option<PathBuf>,

    /// Write diagnostic logs to this file (TUI mode logs nowhere otherwise)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Whether the terminal UI will own the screen.
    pub fn is_interactive(&self) -> bool {
        cfg!(feature = "tui") && !self.json && !self.text && !self.silent
    }

    pub fn validate(&self) -> Result<()> {
        // Validate that --silent can only be used with --json
        if self.silent && !self.json {
            return Err(anyhow::anyhow!(
                "--silent can only be used with --json. Use --silent --json together."
            ));
        }
        check_range("--weight-cutoff", self.weight_cutoff, WEIGHT_CUTOFF_RANGE)?;
        check_range("--redshift-cutoff", self.redshift_cutoff, REDSHIFT_CUTOFF_RANGE)?;
        if !self.is_interactive() && self.input.is_none() {
            return Err(anyhow::anyhow!(
                "--input is required unless running the interactive TUI"
            ));
        }
        Ok(())
    }
}

fn check_range(flag: &str, value: f64, (lo, hi): (f64, f64)) -> Result<()> {
    if !(lo..=hi).contains(&value) {
        return Err(anyhow::anyhow!(
            "{flag} must be between {lo:?} and {hi:?}, got {value}"
        ));
    }
    Ok(())
}

pub async fn run(args: Cli) -> Result<()> {
    args.validate()?;

    // Silent mode takes precedence over other output modes
    if args.silent {
        return run_pipeline(args, true).await;
    }

    if args.is_interactive() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
    }

    if args.json {
        return run_pipeline(args, false).await;
    }

    run_text(args).await
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    let child_output = if args.is_interactive() {
        ChildOutput::AppendTo(
            args.child_log
                .clone()
                .unwrap_or_else(|| args.workdir.join("rscript.log")),
        )
    } else if args.json || args.silent {
        // Stdout carries only the JSON document.
        ChildOutput::Stderr
    } else {
        ChildOutput::Inherit
    };
    RunConfig {
        interpreter: args.rscript.clone(),
        workdir: args.workdir.clone(),
        input: args.input.clone().unwrap_or_default(),
        robust_estimator: args.m_estimator,
        imputation: args.mice,
        weight_cutoff: args.weight_cutoff,
        redshift_cutoff: args.redshift_cutoff,
        child_output,
    }
}

pub(crate) fn post_run_options(args: &Cli) -> PostRunOptions {
    PostRunOptions {
        export_json: args.export_json.clone(),
        clean_up: args.clean_up,
    }
}

/// Run the engine on a blocking thread and wait for it.
async fn execute(
    cfg: RunConfig,
    event_tx: mpsc::UnboundedSender<RunEvent>,
) -> Result<RunResult> {
    let engine = PipelineEngine::new(cfg);
    let result = tokio::task::spawn_blocking(move || engine.run(&event_tx))
        .await
        .context("pipeline task failed")?
        .context("pipeline run failed")?;
    Ok(result)
}

/// Run the pipeline and print the JSON result unless `silent`.
async fn run_pipeline(args: Cli, silent: bool) -> Result<()> {
    let cfg = build_config(&args);
    // Nobody renders progress in these modes; dropping the receiver discards it.
    let (evt_tx, _) = mpsc::unbounded_channel::<RunEvent>();
    let result = execute(cfg, evt_tx).await?;
    let processed = process_run_completion(&post_run_options(&args), result);

    if silent {
        return Ok(());
    }

    let (out_tx, out_handle) = spawn_output_writer();
    for msg in processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
    let out = serde_json::to_string_pretty(&processed.result)?;
    let _ = out_tx.send(OutputLine::Stdout(out));
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

async fn run_text(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RunEvent>();

    let _ = out_tx.send(OutputLine::Stderr(format!("== {} ==", cfg.workflow())));
    let handle = tokio::spawn(execute(cfg, evt_tx));

    while let Some(ev) = evt_rx.recv().await {
        let _ = out_tx.send(OutputLine::Stderr(ev.to_message()));
    }

    let result = match handle.await.context("pipeline task panicked")? {
        Ok(r) => r,
        Err(e) => {
            // Flush progress lines before the error is reported.
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };
    let processed = process_run_completion(&post_run_options(&args), result);
    for msg in &processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(msg.clone()));
    }

    let summary = crate::text_summary::build_text_summary(&processed.result);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("redshift-classifier").chain(argv.iter().copied()))
    }

    #[test]
    fn defaults_match_form_defaults() {
        let args = parse(&["--text", "-i", "data.csv"]);
        assert_eq!(args.weight_cutoff, 0.65);
        assert_eq!(args.redshift_cutoff, 3.0);
        assert!(!args.m_estimator && !args.mice);
        args.validate().unwrap();
    }

    #[test]
    fn out_of_range_cutoffs_are_rejected() {
        assert!(parse(&["--text", "-i", "d.csv", "--weight-cutoff", "1.5"])
            .validate()
            .is_err());
        assert!(parse(&["--text", "-i", "d.csv", "--redshift-cutoff", "1.9"])
            .validate()
            .is_err());
        parse(&["--text", "-i", "d.csv", "--redshift-cutoff", "4.0"])
            .validate()
            .unwrap();
    }

    #[test]
    fn silent_requires_json() {
        assert!(parse(&["--silent", "-i", "d.csv"]).validate().is_err());
        parse(&["--silent", "--json", "-i", "d.csv"]).validate().unwrap();
    }

    #[test]
    fn non_interactive_modes_require_input() {
        assert!(parse(&["--json"]).validate().is_err());
    }

    #[test]
    fn config_follows_toggles() {
        let args = parse(&["--text", "-i", "d.csv", "--m-estimator", "--mice"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.workflow(), crate::model::Workflow::MiceWithEstimator);
        assert_eq!(cfg.child_output, ChildOutput::Inherit);
        assert_eq!(cfg.input, PathBuf::from("d.csv"));
    }

    #[test]
    fn json_modes_keep_child_output_off_stdout() {
        let json = build_config(&parse(&["--json", "-i", "d.csv"]));
        assert_eq!(json.child_output, ChildOutput::Stderr);
        let silent = build_config(&parse(&["--silent", "--json", "-i", "d.csv"]));
        assert_eq!(silent.child_output, ChildOutput::Stderr);
    }
}
