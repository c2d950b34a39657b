use crate::cli::Cli;
use crate::model::{RunConfig, RunEvent, RunResult, Workflow};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::path::PathBuf;
use std::time::Instant;

pub const TAB_FORM: usize = 0;
pub const TAB_PLOTS: usize = 1;
pub const TAB_LOG: usize = 2;
pub const TAB_HELP: usize = 3;
pub const TAB_COUNT: usize = 4;

const MAX_LOG_LINES: usize = 500;

// Sliders hold integer steps so values like 0.65 stay exact.
const WEIGHT_STEPS_PER_UNIT: f64 = 20.0; // 0.05
const REDSHIFT_STEPS_PER_UNIT: f64 = 10.0; // 0.1
const WEIGHT_STEP_RANGE: (i32, i32) = (0, 20);
const REDSHIFT_STEP_RANGE: (i32, i32) = (20, 40);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    MEstimator,
    WeightCutoff,
    Mice,
    RedshiftCutoff,
    Input,
    Submit,
}

pub struct FormState {
    pub focus: usize,
    pub m_estimator: bool,
    pub mice: bool,
    pub weight_steps: i32,
    pub redshift_steps: i32,
    pub input: String,
    pub editing_input: bool,
}

impl FormState {
    pub fn from_args(args: &Cli) -> Self {
        Self {
            focus: 0,
            m_estimator: args.m_estimator,
            mice: args.mice,
            weight_steps: (args.weight_cutoff * WEIGHT_STEPS_PER_UNIT).round() as i32,
            redshift_steps: (args.redshift_cutoff * REDSHIFT_STEPS_PER_UNIT).round() as i32,
            input: args
                .input
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            editing_input: false,
        }
    }

    /// Visible fields; the weight slider only shows when the M-estimator is on.
    pub fn fields(&self) -> Vec<FormField> {
        let mut fields = vec![FormField::MEstimator];
        if self.m_estimator {
            fields.push(FormField::WeightCutoff);
        }
        fields.extend([
            FormField::Mice,
            FormField::RedshiftCutoff,
            FormField::Input,
            FormField::Submit,
        ]);
        fields
    }

    pub fn focused(&self) -> FormField {
        let fields = self.fields();
        fields[self.focus.min(fields.len() - 1)]
    }

    pub fn move_focus(&mut self, delta: i32) {
        let len = self.fields().len() as i32;
        self.focus = (self.focus as i32 + delta).rem_euclid(len) as usize;
    }

    pub fn weight_cutoff(&self) -> f64 {
        self.weight_steps as f64 / WEIGHT_STEPS_PER_UNIT
    }

    pub fn redshift_cutoff(&self) -> f64 {
        self.redshift_steps as f64 / REDSHIFT_STEPS_PER_UNIT
    }

    pub fn workflow(&self) -> Workflow {
        Workflow::select(self.m_estimator, self.mice)
    }

    /// Toggle or step the focused field. `delta` is the slider direction.
    pub fn adjust(&mut self, delta: i32) {
        let focused = self.focused();
        match focused {
            FormField::MEstimator => {
                self.m_estimator = !self.m_estimator;
                // Keep focus on the toggle while the field list changes under it.
                self.focus = 0;
            }
            FormField::Mice => self.mice = !self.mice,
            FormField::WeightCutoff => {
                self.weight_steps =
                    (self.weight_steps + delta).clamp(WEIGHT_STEP_RANGE.0, WEIGHT_STEP_RANGE.1)
            }
            FormField::RedshiftCutoff => {
                self.redshift_steps = (self.redshift_steps + delta)
                    .clamp(REDSHIFT_STEP_RANGE.0, REDSHIFT_STEP_RANGE.1)
            }
            FormField::Input | FormField::Submit => {}
        }
    }

    /// Build a run configuration from the form, or explain what is missing.
    pub fn to_config(&self, base: &RunConfig) -> Result<RunConfig, String> {
        let input = self.input.trim();
        if input.is_empty() {
            return Err("Choose an input file (.csv or .txt) first".into());
        }
        let input = PathBuf::from(input);
        if !crate::storage::is_accepted_input(&input) {
            return Err(format!("{} is not a .csv or .txt file", input.display()));
        }
        if !input.is_file() {
            return Err(format!("{} does not exist", input.display()));
        }
        Ok(RunConfig {
            input,
            robust_estimator: self.m_estimator,
            imputation: self.mice,
            weight_cutoff: self.weight_cutoff(),
            redshift_cutoff: self.redshift_cutoff(),
            ..base.clone()
        })
    }
}

pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub form: FormState,
    pub base_config: RunConfig,

    pub running: bool,
    pub run_start: Option<Instant>,
    pub current_step: Option<(usize, usize, String)>,
    pub log: Vec<String>,

    pub last_result: Option<RunResult>,
    pub plot_selected: usize,
    pub plot_scroll_offset: usize,
}

impl UiState {
    pub fn new(args: &Cli) -> Self {
        Self {
            tab: TAB_FORM,
            info: "Fill in the form and submit".into(),
            form: FormState::from_args(args),
            base_config: crate::cli::build_config(args),
            running: false,
            run_start: None,
            current_step: None,
            log: Vec::new(),
            last_result: None,
            plot_selected: 0,
            plot_scroll_offset: 0,
        }
    }

    pub fn push_log(&mut self, line: String) {
        self.log.push(line);
        if self.log.len() > MAX_LOG_LINES {
            let _ = self.log.drain(0..(self.log.len() - MAX_LOG_LINES));
        }
    }

    pub fn plot_count(&self) -> usize {
        self.last_result.as_ref().map(|r| r.plots.len()).unwrap_or(0)
    }

    pub fn selected_plot_path(&self) -> Option<PathBuf> {
        self.last_result
            .as_ref()
            .and_then(|r| r.plots.get(self.plot_selected))
            .map(|p| p.path.clone())
    }

    pub fn select_plot(&mut self, delta: i32, visible_rows: usize) {
        let count = self.plot_count();
        if count == 0 {
            return;
        }
        let next = (self.plot_selected as i32 + delta).clamp(0, count as i32 - 1) as usize;
        self.plot_selected = next;
        if next < self.plot_scroll_offset {
            self.plot_scroll_offset = next;
        } else if next >= self.plot_scroll_offset + visible_rows.max(1) {
            self.plot_scroll_offset = next + 1 - visible_rows.max(1);
        }
    }

    /// Mark a submission as started and clear the previous run's view.
    pub fn begin_run(&mut self) {
        self.running = true;
        self.run_start = Some(Instant::now());
        self.current_step = None;
        self.last_result = None;
        self.plot_selected = 0;
        self.plot_scroll_offset = 0;
        self.info = format!("Running: {}", self.form.workflow());
        self.push_log(format!("== {} ==", self.form.workflow()));
    }

    pub fn apply_event(&mut self, ev: RunEvent) {
        self.push_log(ev.to_message());
        match ev {
            RunEvent::StepStarted {
                index,
                total,
                script,
            } => {
                self.info = format!("Step {}/{}: {}", index + 1, total, script);
                self.current_step = Some((index, total, script));
            }
            RunEvent::Info(info) => {
                if matches!(info, crate::model::InfoEvent::RunFailed(_)) {
                    self.running = false;
                    self.current_step = None;
                }
                self.info = info.to_message();
            }
            RunEvent::RunCompleted { result } => {
                self.running = false;
                self.current_step = None;
                self.info = if result.plots.is_empty() {
                    format!("Finished, no plots in {}", result.plot_dir.display())
                } else {
                    format!("Finished: {} plot(s)", result.plots.len())
                };
                self.last_result = Some(*result);
                self.plot_selected = 0;
                self.plot_scroll_offset = 0;
                self.tab = TAB_PLOTS;
            }
            RunEvent::InputStaged { .. }
            | RunEvent::ScriptExtracted { .. }
            | RunEvent::StepFinished { .. } => {}
        }
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InfoEvent, Plot};
    use clap::Parser;

    fn args(extra: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("redshift-classifier").chain(extra.iter().copied()))
    }

    #[test]
    fn weight_slider_only_visible_with_estimator() {
        let mut form = FormState::from_args(&args(&[]));
        assert!(!form.fields().contains(&FormField::WeightCutoff));
        form.adjust(1);
        assert!(form.m_estimator);
        assert_eq!(form.fields()[1], FormField::WeightCutoff);
    }

    #[test]
    fn sliders_step_exactly_and_clamp() {
        let mut form = FormState::from_args(&args(&["--m-estimator"]));
        assert_eq!(form.weight_cutoff(), 0.65);
        form.focus = 1;
        form.adjust(1);
        assert_eq!(form.weight_cutoff(), 0.7);
        for _ in 0..30 {
            form.adjust(1);
        }
        assert_eq!(form.weight_cutoff(), 1.0);

        form.focus = 3;
        assert_eq!(form.focused(), FormField::RedshiftCutoff);
        for _ in 0..30 {
            form.adjust(-1);
        }
        assert_eq!(form.redshift_cutoff(), 2.0);
    }

    #[test]
    fn focus_wraps_around() {
        let mut form = FormState::from_args(&args(&[]));
        form.move_focus(-1);
        assert_eq!(form.focused(), FormField::Submit);
        form.move_focus(1);
        assert_eq!(form.focused(), FormField::MEstimator);
    }

    #[test]
    fn config_requires_existing_supported_input() {
        let cli = args(&[]);
        let base = crate::cli::build_config(&cli);
        let mut form = FormState::from_args(&cli);
        assert!(form.to_config(&base).is_err());

        form.input = "table.xlsx".into();
        assert!(form.to_config(&base).unwrap_err().contains("not a .csv"));

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("optical.csv");
        std::fs::write(&input, "z\n1\n").unwrap();
        form.input = input.display().to_string();
        form.mice = true;
        let cfg = form.to_config(&base).unwrap();
        assert_eq!(cfg.workflow(), Workflow::MiceNoEstimator);
        assert_eq!(cfg.input, input);
        assert_eq!(cfg.redshift_cutoff, 3.0);
    }

    #[test]
    fn completion_switches_to_plots() {
        let mut state = UiState::new(&args(&[]));
        state.begin_run();
        let mut result = RunResult {
            timestamp_utc: String::new(),
            workflow: Workflow::RawNoEstimator,
            config: state.base_config.clone(),
            steps: vec![],
            plot_dir: "plots".into(),
            plots: vec![],
            elapsed: std::time::Duration::ZERO,
        };
        result.plots.push(Plot {
            path: "plots/roc.png".into(),
            bytes: 1,
        });
        state.apply_event(RunEvent::RunCompleted {
            result: Box::new(result),
        });
        assert!(!state.running);
        assert_eq!(state.tab, TAB_PLOTS);
        assert_eq!(state.selected_plot_path(), Some(PathBuf::from("plots/roc.png")));
    }

    #[test]
    fn failure_stops_running() {
        let mut state = UiState::new(&args(&[]));
        state.begin_run();
        state.apply_event(RunEvent::Info(InfoEvent::RunFailed("boom".into())));
        assert!(!state.running);
        assert_eq!(state.info, "Run failed: boom");
        assert_eq!(state.tab, TAB_FORM);
    }
}
