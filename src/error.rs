//! Error types for the longpdf library.
//!
//! One enum covers every fatal failure mode; the taxonomy maps onto the
//! pipeline like this:
//!
//! * **Configuration** — [`LongPdfError::UnsupportedFormat`],
//!   [`LongPdfError::ToolMissing`], [`LongPdfError::InvalidConfig`],
//!   [`LongPdfError::PipelineMismatch`]. Wrong setup, never retried.
//! * **External tool** — [`LongPdfError::ToolFailed`],
//!   [`LongPdfError::MissingToolOutput`]. A renderer or converter exited
//!   nonzero or exited zero without producing its declared output file
//!   (exit status alone is not trusted).
//! * **Inspection** — [`LongPdfError::MalformedPdf`]. The fitting loop
//!   cannot proceed without geometry, so this is fatal.
//! * **Wiring** — [`LongPdfError::ArtifactNotFound`]. A stage read a role
//!   no prior stage wrote; a pipeline bug, not a runtime condition.
//!
//! There is deliberately no "soft" error variant here: the one stage that
//! is allowed to fail without aborting (the cosmetic watermark patch)
//! reports [`crate::pipeline::StageOutcome::Skipped`] instead of returning
//! `Err`, so the fatal/cosmetic distinction lives in the type system rather
//! than in a catch-all handler.

use crate::artifact::ArtifactFormat;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the longpdf library.
#[derive(Debug, Error)]
pub enum LongPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input extension is not one the pipeline knows how to stage.
    #[error("Unsupported input format: '{path}'\nSupported extensions: .md, .markdown, .html, .htm, .xhtml, .ipynb")]
    UnsupportedFormat { path: PathBuf },

    // ── Configuration errors ──────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required external tool is not installed or not on PATH.
    #[error("Required tool '{tool}' was not found on PATH.\n{hint}")]
    ToolMissing { tool: String, hint: String },

    // ── External tool errors ──────────────────────────────────────────────
    /// An external tool exited with a nonzero status.
    #[error("'{tool}' failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// An external tool exited zero but its declared output file is absent.
    #[error("'{tool}' exited successfully but produced no output at '{path}'")]
    MissingToolOutput { tool: String, path: PathBuf },

    // ── Inspection errors ─────────────────────────────────────────────────
    /// The rendered PDF cannot be parsed, so no geometry can be measured.
    #[error("Cannot parse PDF '{path}': {detail}")]
    MalformedPdf { path: PathBuf, detail: String },

    // ── Pipeline wiring errors ────────────────────────────────────────────
    /// A stage asked the artifact store for a role nothing has written.
    #[error("No staged artifact for role '{role}' (pipeline wiring bug)")]
    ArtifactNotFound { role: String },

    /// The current artifact's format does not match the stage's declared input.
    #[error("Stage '{stage}' expects {expected} input but the current artifact is {found}")]
    PipelineMismatch {
        stage: &'static str,
        expected: ArtifactFormat,
        found: ArtifactFormat,
    },

    /// A stage failed; carries the stage name for the one-line diagnostic.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: &'static str,
        #[source]
        source: Box<LongPdfError>,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write the final PDF to the destination path.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure, with the path it happened on.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failed_names_the_stage() {
        let e = LongPdfError::StageFailed {
            stage: "fit-render",
            source: Box::new(LongPdfError::ToolMissing {
                tool: "prince".into(),
                hint: "install it".into(),
            }),
        };
        let msg = e.to_string();
        assert!(msg.contains("fit-render"), "got: {msg}");
        assert!(msg.contains("prince"), "got: {msg}");
    }

    #[test]
    fn mismatch_display_names_both_formats() {
        let e = LongPdfError::PipelineMismatch {
            stage: "fit-render",
            expected: ArtifactFormat::StructuredMarkup,
            found: ArtifactFormat::Markup,
        };
        let msg = e.to_string();
        assert!(msg.contains("structured-markup"), "got: {msg}");
        assert!(msg.contains("markup"), "got: {msg}");
    }

    #[test]
    fn tool_missing_carries_hint() {
        let e = LongPdfError::ToolMissing {
            tool: "pandoc".into(),
            hint: "See https://pandoc.org/installing.html".into(),
        };
        assert!(e.to_string().contains("pandoc.org"));
    }
}
