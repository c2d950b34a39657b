use crate::model::{Plot, EXCLUDED_PLOT_PREFIXES};
use crate::TRACING_TARGET_ENGINE;
use std::path::Path;

/// Whether a file name is a plot that should be shown.
pub fn is_displayable(name: &str) -> bool {
    name.ends_with(".png") && !EXCLUDED_PLOT_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// List displayable plots in `dir`, in directory-listing order.
///
/// A missing or unreadable directory yields an empty list.
pub fn list_plots(dir: &Path) -> Vec<Plot> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(
                target: TRACING_TARGET_ENGINE,
                dir = %dir.display(),
                error = %e,
                "plot directory not readable"
            );
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_displayable(&entry.file_name().to_string_lossy()))
        .filter_map(|entry| {
            let path = entry.path();
            // Follows symlinks, so a linked PNG is listed like a regular one.
            let meta = std::fs::metadata(&path).ok()?;
            meta.is_file().then(|| Plot {
                path,
                bytes: meta.len(),
            })
        })
        .collect()
}
