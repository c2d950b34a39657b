use crate::engine::invoke::{ChildOutput, InvocationArgs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed name the uploaded dataset is copied to before the first step.
pub const STAGED_INPUT_FILE: &str = "training_data.csv";

/// Plot name prefixes that are produced as diagnostics and never shown.
pub const EXCLUDED_PLOT_PREFIXES: [&str; 2] = ["AlgoRiskHisto", "AlgoWeightHisto"];

pub const DEFAULT_WEIGHT_CUTOFF: f64 = 0.65;
pub const DEFAULT_REDSHIFT_CUTOFF: f64 = 3.0;
pub const WEIGHT_CUTOFF_RANGE: (f64, f64) = (0.0, 1.0);
pub const REDSHIFT_CUTOFF_RANGE: (f64, f64) = (2.0, 4.0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub interpreter: PathBuf,
    /// Documents, generated scripts, staged input and plot directories live here.
    pub workdir: PathBuf,
    pub input: PathBuf,
    pub robust_estimator: bool,
    pub imputation: bool,
    pub weight_cutoff: f64,
    pub redshift_cutoff: f64,
    #[serde(default)]
    pub child_output: ChildOutput,
}

impl RunConfig {
    pub fn workflow(&self) -> Workflow {
        Workflow::select(self.robust_estimator, self.imputation)
    }

    pub fn staged_input(&self) -> PathBuf {
        self.workdir.join(STAGED_INPUT_FILE)
    }
}

/// The four analysis pipelines, selected by the two form toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Workflow {
    RawNoEstimator,
    RawWithEstimator,
    MiceNoEstimator,
    MiceWithEstimator,
}

/// Values a step takes from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepArg {
    StagedInput,
    RedshiftCutoff,
    WeightCutoff,
}

/// One document-to-script conversion followed by one interpreter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Document stem; the document is `<stem>.Rmd`, the script `<stem>.R`.
    pub stem: &'static str,
    pub args: &'static [StepArg],
}

impl Step {
    pub fn document(&self) -> String {
        format!("{}.Rmd", self.stem)
    }

    pub fn script(&self) -> String {
        format!("{}.R", self.stem)
    }

    /// Fill the step's argument slots from the configuration.
    pub fn invocation_args(&self, cfg: &RunConfig) -> InvocationArgs {
        let mut args = InvocationArgs::default();
        for arg in self.args {
            match arg {
                StepArg::StagedInput => args.input_file = Some(PathBuf::from(STAGED_INPUT_FILE)),
                StepArg::RedshiftCutoff => args.cutoff = Some(cfg.redshift_cutoff),
                StepArg::WeightCutoff => args.weight_cutoff = Some(cfg.weight_cutoff),
            }
        }
        args
    }
}

const M_ESTIMATOR: Step = Step {
    stem: "M-estimator_XRAY_ON_RAW_DATA",
    args: &[StepArg::StagedInput, StepArg::WeightCutoff],
};

const RAW_NO_ESTIMATOR_STEPS: &[Step] = &[Step {
    stem: "data-XRAY-Classification_ON_RAW-WITHOUT-M-estimator",
    args: &[StepArg::StagedInput, StepArg::RedshiftCutoff],
}];

const RAW_WITH_ESTIMATOR_STEPS: &[Step] = &[
    M_ESTIMATOR,
    Step {
        stem: "data-XRAY-Classification_ON_RAW-WITH-M-estimator",
        args: &[StepArg::RedshiftCutoff],
    },
];

const MICE_NO_ESTIMATOR_STEPS: &[Step] = &[
    Step {
        stem: "MICE-Imputation_RAW-without_M-estimator",
        args: &[StepArg::StagedInput],
    },
    Step {
        stem: "data-XRAY-Classification_ON_MICE-RAW-WITHOUT-M-estimator",
        args: &[StepArg::RedshiftCutoff],
    },
];

const MICE_WITH_ESTIMATOR_STEPS: &[Step] = &[
    M_ESTIMATOR,
    Step {
        stem: "MICE-Imputation_RAW-with_M-estimator",
        args: &[StepArg::StagedInput],
    },
    Step {
        stem: "data-XRAY-Classification_ON_MICE-RAW-WITH-M-estimator",
        args: &[StepArg::RedshiftCutoff],
    },
];

impl Workflow {
    pub fn select(robust_estimator: bool, imputation: bool) -> Self {
        match (robust_estimator, imputation) {
            (false, false) => Workflow::RawNoEstimator,
            (true, false) => Workflow::RawWithEstimator,
            (false, true) => Workflow::MiceNoEstimator,
            (true, true) => Workflow::MiceWithEstimator,
        }
    }

    pub fn steps(self) -> &'static [Step] {
        match self {
            Workflow::RawNoEstimator => RAW_NO_ESTIMATOR_STEPS,
            Workflow::RawWithEstimator => RAW_WITH_ESTIMATOR_STEPS,
            Workflow::MiceNoEstimator => MICE_NO_ESTIMATOR_STEPS,
            Workflow::MiceWithEstimator => MICE_WITH_ESTIMATOR_STEPS,
        }
    }

    /// Directory (relative to the working directory) the scripts write plots to.
    pub fn plot_dir(self) -> &'static Path {
        Path::new(match self {
            Workflow::RawNoEstimator => "CURRENT_ANALYSIS/Graphics/XRAY/RAW_WITHOUT_M-estimator/",
            Workflow::RawWithEstimator => "CURRENT_ANALYSIS/Graphics/XRAY/RAW_WITH_M-estimator/",
            Workflow::MiceNoEstimator => "CURRENT_ANALYSIS/Graphics/XRAY/MICE_WITHOUT_M-estimator/",
            Workflow::MiceWithEstimator => "CURRENT_ANALYSIS/Graphics/XRAY/MICE_WITH_M-estimator/",
        })
    }

    pub fn uses_robust_estimator(self) -> bool {
        matches!(
            self,
            Workflow::RawWithEstimator | Workflow::MiceWithEstimator
        )
    }

    pub fn uses_imputation(self) -> bool {
        matches!(
            self,
            Workflow::MiceNoEstimator | Workflow::MiceWithEstimator
        )
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Workflow::RawNoEstimator => "raw data, no M-estimator",
            Workflow::RawWithEstimator => "raw data, M-estimator",
            Workflow::MiceNoEstimator => "MICE imputation, no M-estimator",
            Workflow::MiceWithEstimator => "MICE imputation, M-estimator",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    InputStaged {
        path: PathBuf,
    },
    StepStarted {
        index: usize,
        total: usize,
        script: String,
    },
    ScriptExtracted {
        index: usize,
        chunks: usize,
        document_found: bool,
    },
    StepFinished {
        index: usize,
        #[serde(with = "humantime_serde")]
        elapsed: Duration,
    },
    Info(InfoEvent),
    RunCompleted {
        result: Box<RunResult>,
    },
}

/// Structured info events emitted by the controller and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    RunFailed(String),
    RunBusy,
    WaitingForRun,
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::RunFailed(err) => format!("Run failed: {err}"),
            InfoEvent::RunBusy => "A run is already in progress".to_string(),
            InfoEvent::WaitingForRun => "Waiting for the current run to finish…".to_string(),
        }
    }
}

impl RunEvent {
    pub fn to_message(&self) -> String {
        match self {
            RunEvent::InputStaged { path } => format!("Staged input at {}", path.display()),
            RunEvent::StepStarted {
                index,
                total,
                script,
            } => format!("[{}/{}] {}", index + 1, total, script),
            RunEvent::ScriptExtracted {
                chunks,
                document_found: true,
                ..
            } => format!("  extracted {chunks} chunk(s)"),
            RunEvent::ScriptExtracted {
                document_found: false,
                ..
            } => "  document missing, running empty script".to_string(),
            RunEvent::StepFinished { elapsed, .. } => {
                format!("  done in {}", humantime::format_duration(round_ms(*elapsed)))
            }
            RunEvent::Info(info) => info.to_message(),
            RunEvent::RunCompleted { result } => {
                format!("Run completed: {} plot(s)", result.plots.len())
            }
        }
    }
}

/// Truncate to whole milliseconds so durations print compactly.
pub fn round_ms(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub document: String,
    pub script: String,
    pub chunks: usize,
    pub command: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot {
    pub path: PathBuf,
    pub bytes: u64,
}

impl Plot {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub timestamp_utc: String,
    pub workflow: Workflow,
    pub config: RunConfig,
    pub steps: Vec<StepRecord>,
    pub plot_dir: PathBuf,
    pub plots: Vec<Plot>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}
