//! Text summary builder for CLI output.
//!
//! Formats a finished run as human-readable lines for text mode.

use crate::model::{round_ms, RunResult};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a completed run.
pub(crate) fn build_text_summary(result: &RunResult) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Workflow: {}", result.workflow));
    lines.push(format!("Input: {}", result.config.input.display()));
    if result.workflow.uses_robust_estimator() {
        lines.push(format!("Weight cutoff: {:?}", result.config.weight_cutoff));
    }
    if result.workflow.uses_imputation() {
        lines.push("Imputation: MICE".to_string());
    }
    lines.push(format!("Redshift cutoff: {:?}", result.config.redshift_cutoff));

    for step in &result.steps {
        lines.push(format!(
            "Step {}: {} chunk(s), {}",
            step.script,
            step.chunks,
            humantime::format_duration(round_ms(step.elapsed))
        ));
    }

    if result.plots.is_empty() {
        lines.push(format!("No plots found in {}", result.plot_dir.display()));
    } else {
        lines.push(format!(
            "Plots ({} in {}):",
            result.plots.len(),
            result.plot_dir.display()
        ));
        for plot in &result.plots {
            lines.push(format!("  {}", plot.path.display()));
        }
    }

    lines.push(format!(
        "Total: {}",
        humantime::format_duration(round_ms(result.elapsed))
    ));

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::invoke::ChildOutput;
    use crate::model::{Plot, RunConfig, Workflow};
    use std::time::Duration;

    #[test]
    fn lists_plots_in_result_order() {
        let result = RunResult {
            timestamp_utc: "2026-01-01T00:00:00Z".into(),
            workflow: Workflow::RawNoEstimator,
            config: RunConfig {
                interpreter: "Rscript".into(),
                workdir: ".".into(),
                input: "optical.csv".into(),
                robust_estimator: false,
                imputation: false,
                weight_cutoff: 0.65,
                redshift_cutoff: 3.0,
                child_output: ChildOutput::Inherit,
            },
            steps: vec![],
            plot_dir: "plots".into(),
            plots: vec![
                Plot {
                    path: "plots/z.png".into(),
                    bytes: 10,
                },
                Plot {
                    path: "plots/a.png".into(),
                    bytes: 20,
                },
            ],
            elapsed: Duration::from_millis(1500),
        };

        let lines = build_text_summary(&result).lines;
        assert!(!lines.iter().any(|l| l.starts_with("Weight cutoff")));
        assert!(!lines.iter().any(|l| l.starts_with("Imputation")));
        assert!(lines.contains(&"Redshift cutoff: 3.0".to_string()));
        let z = lines.iter().position(|l| l == "  plots/z.png").unwrap();
        let a = lines.iter().position(|l| l == "  plots/a.png").unwrap();
        assert!(z < a);
        assert_eq!(lines.last().unwrap(), "Total: 1s 500ms");
    }
}
