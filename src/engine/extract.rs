//! R Markdown chunk extraction.
//!
//! Turns a literate document into a runnable script by concatenating the
//! bodies of its `{r ...}` code chunks. Extraction is pure; writing the
//! script to disk is done separately by [`convert_document`].

use crate::error::{PipelineError, PipelineResult};
use crate::TRACING_TARGET_EXTRACT;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

static R_CHUNK: OnceLock<Regex> = OnceLock::new();

/// Chunk header is ```` ```{r <attrs>} ````, optionally followed by one line break.
/// Matching is lazy and non-recursive, so nested fences are not understood.
fn r_chunk_pattern() -> &'static Regex {
    R_CHUNK.get_or_init(|| {
        Regex::new(r"(?s)```\{r.*?\}\r?\n?(.*?)```").expect("R chunk pattern is valid")
    })
}

/// Return the body of every R chunk in document order.
pub fn extract_chunks(document: &str) -> Vec<&str> {
    r_chunk_pattern()
        .captures_iter(document)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Extract all R chunks and join them with a single newline.
///
/// Returns an empty string when the document has no chunks.
pub fn extract(document: &str) -> String {
    extract_chunks(document).join("\n")
}

/// Summary of one document-to-script conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub chunks: usize,
    pub bytes: usize,
    /// False when the document did not exist and an empty script was written.
    pub document_found: bool,
}

/// Read `document`, extract its chunks and write them to `script`, replacing
/// any previous content.
///
/// A missing document yields an empty script rather than an error; the
/// interpreter is left to fail on it.
pub fn convert_document(document: &Path, script: &Path) -> PipelineResult<Conversion> {
    // Stray non-UTF-8 bytes in the prose must not cost the chunks.
    let (text, document_found) = match std::fs::read(document) {
        Ok(bytes) => (String::from_utf8_lossy(&bytes).into_owned(), true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                target: TRACING_TARGET_EXTRACT,
                document = %document.display(),
                "document not found, writing empty script"
            );
            (String::new(), false)
        }
        Err(e) => {
            return Err(PipelineError::io(
                format!("read document {}", document.display()),
                e,
            ))
        }
    };

    let chunks = extract_chunks(&text).len();
    let body = extract(&text);
    std::fs::write(script, &body)
        .map_err(|e| PipelineError::io(format!("write script {}", script.display()), e))?;

    tracing::debug!(
        target: TRACING_TARGET_EXTRACT,
        document = %document.display(),
        script = %script.display(),
        chunks,
        bytes = body.len(),
        "converted document"
    );

    Ok(Conversion {
        chunks,
        bytes: body.len(),
        document_found,
    })
}
