//! CLI output formatting for pipeline states.
//!
//! # Output Format
//!
//! ## Upload
//!
//! One block per published state. Later progress snapshots within
//! `Uploading` print only the bar:
//!
//! ```text
//! Validating photo.jpg
//! Transforming
//! Uploading
//!     [----------]   0%
//!     Payload: 878.9 KB
//!     [#####-----]  50%
//! Uploaded → http://localhost:8080/uploads/pixels/1760000000000-k3v9q0zz.jpg
//!     Size: 878.9 KB
//! ```
//!
//! Failures lead with the message, followed by the class and whether
//! `retry` would be accepted:
//!
//! ```text
//! Failed: Network failure: connection reset
//!     Kind: upload (retryable)
//!     Retained: photo.jpg
//! ```
//!
//! ## Check
//!
//! ```text
//! photo.jpg
//!     Type: image/jpeg
//!     Size: 5.8 MB
//!     OK
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure — no I/O, no side effects.

use crate::error::{ErrorKind, ValidationError};
use crate::pipeline::{Phase, PipelineState};
use crate::types::SourceFile;

const BAR_WIDTH: usize = 10;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count with one decimal, binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Fixed-width progress bar.
///
/// ```text
/// [###-------]  30%
/// ```
fn progress_bar(percent: u8) -> String {
    let percent = percent.min(100);
    let filled = percent as usize * BAR_WIDTH / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        percent
    )
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::Transform => "transform",
        ErrorKind::Upload => "upload",
    }
}

// ============================================================================
// Upload output
// ============================================================================

/// Format one published state as display lines.
///
/// `filename` labels the `Validating` header so the first line names the
/// file being processed.
pub fn format_state(state: &PipelineState, filename: &str) -> Vec<String> {
    let mut lines = Vec::new();
    match state.phase {
        Phase::Idle => lines.push("Idle".to_string()),
        Phase::Validating => lines.push(format!("Validating {}", filename)),
        Phase::Transforming => lines.push("Transforming".to_string()),
        Phase::Cropping => {
            lines.push("Cropping".to_string());
            if let Some(size) = state.compressed_byte_size {
                lines.push(format!("{}Payload: {}", indent(1), format_bytes(size)));
            }
        }
        Phase::Uploading => {
            lines.push("Uploading".to_string());
            lines.push(format!("{}{}", indent(1), progress_bar(state.progress_percent)));
            if let Some(size) = state.compressed_byte_size {
                lines.push(format!("{}Payload: {}", indent(1), format_bytes(size)));
            }
        }
        Phase::Succeeded => match &state.uploaded {
            Some(object) => {
                lines.push(format!("Uploaded \u{2192} {}", object.public_url));
                lines.push(format!("{}Size: {}", indent(1), format_bytes(object.byte_size)));
            }
            None => lines.push("Uploaded".to_string()),
        },
        Phase::Failed => {
            match &state.last_error {
                Some(error) => {
                    lines.push(format!("Failed: {}", error));
                    let retry = if error.retryable() {
                        "retryable"
                    } else {
                        "not retryable"
                    };
                    lines.push(format!(
                        "{}Kind: {} ({})",
                        indent(1),
                        kind_label(error.kind()),
                        retry
                    ));
                }
                None => lines.push("Failed".to_string()),
            }
            if let Some(source) = &state.retained_source {
                lines.push(format!("{}Retained: {}", indent(1), source.filename));
            }
        }
        Phase::Cancelled => lines.push("Cancelled".to_string()),
    }
    lines
}

/// Format a state given the phase that was displayed before it.
///
/// Repeated `Uploading` snapshots only carry new progress, so they collapse
/// to the bar line.
pub fn format_transition(
    previous: Option<Phase>,
    state: &PipelineState,
    filename: &str,
) -> Vec<String> {
    if previous == Some(Phase::Uploading) && state.phase == Phase::Uploading {
        return vec![format!("{}{}", indent(1), progress_bar(state.progress_percent))];
    }
    format_state(state, filename)
}

/// Print a state to stdout.
pub fn print_transition(previous: Option<Phase>, state: &PipelineState, filename: &str) {
    for line in format_transition(previous, state, filename) {
        println!("{}", line);
    }
}

/// One JSON object per state, for machine consumers.
pub fn format_state_json(state: &PipelineState) -> Result<String, serde_json::Error> {
    serde_json::to_string(state)
}

// ============================================================================
// Check output
// ============================================================================

/// Format the result of validating `file` without running the pipeline.
pub fn format_check(file: &SourceFile, result: &Result<(), ValidationError>) -> Vec<String> {
    let mut lines = vec![file.filename.clone()];
    lines.push(format!("{}Type: {}", indent(1), file.mime_type));
    lines.push(format!("{}Size: {}", indent(1), format_bytes(file.byte_len)));
    match result {
        Ok(()) => lines.push(format!("{}OK", indent(1))),
        Err(err) => lines.push(format!("{}Rejected: {}", indent(1), err)),
    }
    lines
}

pub fn print_check(file: &SourceFile, result: &Result<(), ValidationError>) {
    for line in format_check(file, result) {
        println!("{}", line);
    }
}
