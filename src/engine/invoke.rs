//! External interpreter invocation.
//!
//! The R scripts read their arguments by position, so the order in
//! [`ARG_ORDER`] is part of the contract with them. Absent arguments are
//! skipped entirely; nothing shifts into their slot as an empty string.

use crate::error::{ExternalProcessError, InvokeError};
use crate::TRACING_TARGET_INVOKE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Positional argument slots understood by the pipeline scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgName {
    OutputFile,
    InputFile,
    ApplyImputation,
    ApplyUpsampling,
    UseRobustEstimator,
    CustomModels,
    RobustEstimatorWeight,
    LoopCount,
    CorrelationCutoff,
    RmseCutoff,
    Cutoff,
    WeightCutoff,
}

/// Declaration order of the positional arguments.
pub const ARG_ORDER: [ArgName; 12] = [
    ArgName::OutputFile,
    ArgName::InputFile,
    ArgName::ApplyImputation,
    ArgName::ApplyUpsampling,
    ArgName::UseRobustEstimator,
    ArgName::CustomModels,
    ArgName::RobustEstimatorWeight,
    ArgName::LoopCount,
    ArgName::CorrelationCutoff,
    ArgName::RmseCutoff,
    ArgName::Cutoff,
    ArgName::WeightCutoff,
];

impl ArgName {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgName::OutputFile => "output_file",
            ArgName::InputFile => "input_file",
            ArgName::ApplyImputation => "apply_imputation",
            ArgName::ApplyUpsampling => "apply_upsampling",
            ArgName::UseRobustEstimator => "use_robust_estimator",
            ArgName::CustomModels => "custom_models",
            ArgName::RobustEstimatorWeight => "robust_estimator_weight",
            ArgName::LoopCount => "loop_count",
            ArgName::CorrelationCutoff => "correlation_cutoff",
            ArgName::RmseCutoff => "rmse_cutoff",
            ArgName::Cutoff => "cutoff",
            ArgName::WeightCutoff => "weight_cutoff",
        }
    }
}

/// A supplied argument value, rendered the way the scripts expect it.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Path(PathBuf),
    Text(String),
    Bool(bool),
    Float(f64),
    Int(u32),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Path(p) => write!(f, "{}", p.display()),
            ArgValue::Text(s) => f.write_str(s),
            // The scripts compare against R-style capitalised literals.
            ArgValue::Bool(true) => f.write_str("True"),
            ArgValue::Bool(false) => f.write_str("False"),
            // Debug keeps the decimal point on whole numbers: 3.0, not 3.
            ArgValue::Float(v) => write!(f, "{v:?}"),
            ArgValue::Int(v) => write!(f, "{v}"),
        }
    }
}

/// Optional positional arguments for one interpreter call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationArgs {
    pub output_file: Option<PathBuf>,
    pub input_file: Option<PathBuf>,
    pub apply_imputation: Option<bool>,
    pub apply_upsampling: Option<bool>,
    pub use_robust_estimator: Option<bool>,
    pub custom_models: Option<String>,
    pub robust_estimator_weight: Option<f64>,
    pub loop_count: Option<u32>,
    pub correlation_cutoff: Option<f64>,
    pub rmse_cutoff: Option<f64>,
    pub cutoff: Option<f64>,
    pub weight_cutoff: Option<f64>,
}

impl InvocationArgs {
    pub fn get(&self, name: ArgName) -> Option<ArgValue> {
        match name {
            ArgName::OutputFile => self.output_file.clone().map(ArgValue::Path),
            ArgName::InputFile => self.input_file.clone().map(ArgValue::Path),
            ArgName::ApplyImputation => self.apply_imputation.map(ArgValue::Bool),
            ArgName::ApplyUpsampling => self.apply_upsampling.map(ArgValue::Bool),
            ArgName::UseRobustEstimator => self.use_robust_estimator.map(ArgValue::Bool),
            ArgName::CustomModels => self.custom_models.clone().map(ArgValue::Text),
            ArgName::RobustEstimatorWeight => self.robust_estimator_weight.map(ArgValue::Float),
            ArgName::LoopCount => self.loop_count.map(ArgValue::Int),
            ArgName::CorrelationCutoff => self.correlation_cutoff.map(ArgValue::Float),
            ArgName::RmseCutoff => self.rmse_cutoff.map(ArgValue::Float),
            ArgName::Cutoff => self.cutoff.map(ArgValue::Float),
            ArgName::WeightCutoff => self.weight_cutoff.map(ArgValue::Float),
        }
    }

    /// Supplied arguments in declaration order.
    pub fn positional(&self) -> Vec<(ArgName, ArgValue)> {
        ARG_ORDER
            .iter()
            .filter_map(|&name| self.get(name).map(|v| (name, v)))
            .collect()
    }

    /// Rendered argument tokens in declaration order.
    pub fn tokens(&self) -> Vec<String> {
        self.positional()
            .into_iter()
            .map(|(_, v)| v.to_string())
            .collect()
    }
}

/// Where the child's stdout/stderr go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildOutput {
    /// Share the parent's streams.
    #[default]
    Inherit,
    /// Send the child's stdout to the parent's stderr, leaving stdout free
    /// for machine-readable output.
    Stderr,
    /// Append both streams to a log file, keeping the terminal clean.
    AppendTo(PathBuf),
}

/// One fully described interpreter call.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub interpreter: &'a Path,
    pub script: &'a Path,
    pub args: &'a InvocationArgs,
    pub current_dir: Option<&'a Path>,
    pub output: &'a ChildOutput,
}

impl Invocation<'_> {
    /// `[interpreter, script, args...]`
    pub fn command_line(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(2 + ARG_ORDER.len());
        tokens.push(self.interpreter.display().to_string());
        tokens.push(self.script.display().to_string());
        tokens.extend(self.args.tokens());
        tokens
    }

    /// Run the interpreter and block until it exits.
    pub fn run(&self) -> Result<(), InvokeError> {
        let command_line = self.command_line();
        let mut cmd = Command::new(self.interpreter);
        cmd.arg(self.script);
        cmd.args(&command_line[2..]);
        if let Some(dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        match self.output {
            ChildOutput::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            ChildOutput::Stderr => {
                cmd.stdout(Stdio::from(std::io::stderr()))
                    .stderr(Stdio::inherit());
            }
            ChildOutput::AppendTo(path) => {
                let log = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InvokeError::OutputLog {
                        path: path.clone(),
                        source,
                    })?;
                let log_err = log.try_clone().map_err(|source| InvokeError::OutputLog {
                    path: path.clone(),
                    source,
                })?;
                cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
            }
        }
        cmd.stdin(Stdio::null());

        tracing::info!(
            target: TRACING_TARGET_INVOKE,
            command = %command_line.join(" "),
            "running external interpreter"
        );
        for (name, value) in self.args.positional() {
            tracing::debug!(
                target: TRACING_TARGET_INVOKE,
                arg = name.as_str(),
                value = %value,
                "positional argument"
            );
        }

        let status = cmd.status().map_err(|source| InvokeError::Spawn {
            program: self.interpreter.display().to_string(),
            source,
        })?;

        if status.success() {
            tracing::debug!(target: TRACING_TARGET_INVOKE, "interpreter exited cleanly");
            return Ok(());
        }

        tracing::warn!(
            target: TRACING_TARGET_INVOKE,
            code = ?status.code(),
            "interpreter exited with failure"
        );
        Err(ExternalProcessError {
            command: command_line,
            code: status.code(),
        }
        .into())
    }
}
