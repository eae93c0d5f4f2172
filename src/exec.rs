//! External tool invocation: the one seam where the pipeline shells out.
//!
//! ## Why check for the output file, not just the exit status?
//!
//! The document converters this crate drives have been observed to exit
//! zero while writing nothing (e.g. when an output directory component is
//! missing). Treating "declared output file exists" as the success signal
//! catches that class of failure at the boundary instead of letting a
//! later stage fail on a missing artifact.
//!
//! No retry logic lives here: a failed invocation is surfaced as-is, and
//! the only loop that re-invokes a tool is the page-fit renderer's own
//! grow/measure/finalize sequence.

use crate::error::LongPdfError;
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried in an error message.
const STDERR_LIMIT: usize = 2000;

/// Run `command` to completion and require `expected_output` to exist
/// afterwards.
///
/// * Program not found on PATH → [`LongPdfError::ToolMissing`] with
///   `install_hint` for the user-facing message.
/// * Nonzero exit → [`LongPdfError::ToolFailed`] with captured stderr.
/// * Zero exit but no output file → [`LongPdfError::MissingToolOutput`].
pub fn run_expecting_output(
    tool: &str,
    command: &mut Command,
    expected_output: &Path,
    install_hint: &str,
) -> Result<(), LongPdfError> {
    debug!(tool, "invoking external tool");
    let output = command.output().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            LongPdfError::ToolMissing {
                tool: tool.to_string(),
                hint: install_hint.to_string(),
            }
        } else {
            LongPdfError::ToolFailed {
                tool: tool.to_string(),
                status: "failed to spawn".to_string(),
                stderr: e.to_string(),
            }
        }
    })?;

    if !output.status.success() {
        return Err(LongPdfError::ToolFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: stderr_excerpt(&output.stderr),
        });
    }

    if !expected_output.exists() {
        return Err(LongPdfError::MissingToolOutput {
            tool: tool.to_string(),
            path: expected_output.to_path_buf(),
        });
    }

    Ok(())
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "(no stderr)".to_string();
    }
    let mut excerpt: String = text.chars().take(STDERR_LIMIT).collect();
    if excerpt.len() < text.len() {
        excerpt.push('…');
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_maps_to_tool_missing() {
        let out = std::env::temp_dir().join("never-written.out");
        let err = run_expecting_output(
            "longpdf-no-such-tool",
            Command::new("longpdf-no-such-tool-e5b1").arg("x"),
            &out,
            "install hint",
        )
        .unwrap_err();
        assert!(matches!(err, LongPdfError::ToolMissing { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_maps_to_tool_failed() {
        let out = std::env::temp_dir().join("never-written.out");
        let err = run_expecting_output(
            "false",
            &mut Command::new("false"),
            &out,
            "unused",
        )
        .unwrap_err();
        assert!(matches!(err, LongPdfError::ToolFailed { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_without_output_is_missing_output() {
        let out = std::env::temp_dir().join(format!("longpdf-absent-{}", std::process::id()));
        let err = run_expecting_output("true", &mut Command::new("true"), &out, "unused")
            .unwrap_err();
        assert!(matches!(err, LongPdfError::MissingToolOutput { .. }), "{err}");
    }

    #[test]
    fn stderr_excerpt_is_bounded() {
        let long = "e".repeat(5000);
        let excerpt = stderr_excerpt(long.as_bytes());
        assert!(excerpt.chars().count() <= STDERR_LIMIT + 1);
        assert!(excerpt.ends_with('…'));
    }
}
