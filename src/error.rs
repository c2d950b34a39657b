//! Typed errors for the pipeline engine.
//!
//! The engine returns these; the CLI, controller and TUI layers wrap them in
//! `anyhow` with added context.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// The external interpreter ran but exited unsuccessfully.
#[derive(Debug, Error)]
#[error("external process `{}` exited with {}", .command.join(" "), describe_code(.code))]
pub struct ExternalProcessError {
    /// Full command line, interpreter first.
    pub command: Vec<String>,
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Errors raised while invoking the external interpreter.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The process could not be started at all (e.g. missing interpreter).
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The child's output log could not be opened.
    #[error("failed to open process log {}: {source}", .path.display())]
    OutputLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The process started and exited with a non-zero status.
    #[error(transparent)]
    Failed(#[from] ExternalProcessError),
}

impl InvokeError {
    /// Exit code of the failed process, if it ran at all.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Spawn { .. } | Self::OutputLog { .. } => None,
            Self::Failed(e) => e.code,
        }
    }
}

/// Errors raised by the pipeline engine.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Uploaded dataset does not carry an accepted extension.
    #[error("unsupported input file {}: expected a .csv or .txt file", .0.display())]
    UnsupportedInput(PathBuf),

    /// Filesystem failure while staging input or writing scripts.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A workflow step failed to run.
    #[error("step {step} ({script}) failed")]
    Invoke {
        step: usize,
        script: String,
        #[source]
        source: InvokeError,
    },
}

impl PipelineError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_process_error_names_command_and_status() {
        let err = ExternalProcessError {
            command: vec!["Rscript".into(), "a.R".into(), "d.csv".into()],
            code: Some(1),
        };
        assert_eq!(
            err.to_string(),
            "external process `Rscript a.R d.csv` exited with status 1"
        );
    }

    #[test]
    fn signal_termination_has_no_code() {
        let err = InvokeError::from(ExternalProcessError {
            command: vec!["Rscript".into()],
            code: None,
        });
        assert_eq!(err.exit_code(), None);
        assert!(err.to_string().contains("terminated by signal"));
    }
}
