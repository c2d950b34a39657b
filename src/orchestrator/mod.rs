//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (one run at a time, quit waits for the
//! active run) and post-run processing such as JSON export and clean-up. UI/CLI
//! layers call into this module to keep responsibilities separated.

#[cfg(feature = "tui")]
mod controller;
mod post_process;

#[cfg(feature = "tui")]
pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::{process_run_completion, PostRunOptions};
