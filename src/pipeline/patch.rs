//! Watermark patch stage: cosmetic, best-effort, never fatal.
//!
//! The layout renderer stamps its license annotation into every PDF it
//! produces. This stage neutralises it: decompress the stream layer with
//! `qpdf --qdf`, blank the vendor byte patterns, recompress. The
//! substitutions are strictly length-preserving so the decompressed
//! file's object offsets stay valid and `qpdf` can read it back without
//! reconstruction.
//!
//! Any failure here (tool missing, nonzero exit, unreadable bytes)
//! becomes [`StageOutcome::Skipped`] and the unmodified binary flows on.
//! A missing watermark patch is not worth losing the document over.

use crate::artifact::{ArtifactFormat, ArtifactStore};
use crate::error::LongPdfError;
use crate::exec::run_expecting_output;
use crate::pipeline::{Stage, StageOutcome, DOCUMENT_ROLE};
use once_cell::sync::Lazy;
use regex::bytes::{Captures, Regex};
use std::fs;
use std::process::Command;
use tracing::{debug, warn};

static RE_VENDOR_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)https?://www\.princexml\.com[/A-Za-z0-9._~-]*").unwrap());

static RE_VENDOR_PRODUCER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)Prince \d+(\.\d+)*").unwrap());

/// Blank every vendor byte pattern with same-length padding. Returns the
/// patched bytes and the number of substitutions made.
pub fn apply_patch_rules(data: &[u8]) -> (Vec<u8>, usize) {
    fn blank(caps: &Captures<'_>) -> Vec<u8> {
        vec![b' '; caps[0].len()]
    }
    let mut count = RE_VENDOR_URI.find_iter(data).count();
    let pass1 = RE_VENDOR_URI.replace_all(data, blank);
    count += RE_VENDOR_PRODUCER.find_iter(&pass1).count();
    let pass2 = RE_VENDOR_PRODUCER.replace_all(&pass1, blank);
    (pass2.into_owned(), count)
}

/// PaginatedBinary → PaginatedBinary stage wrapping `qpdf`.
pub struct PatchStage {
    tool: String,
}

impl PatchStage {
    pub fn new() -> Self {
        Self {
            tool: "qpdf".to_string(),
        }
    }

    /// Use a different binary name; lets tests exercise the soft-fail path
    /// deterministically.
    pub fn with_tool(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    fn try_patch(&self, store: &ArtifactStore) -> Result<(), LongPdfError> {
        let input = store.path(DOCUMENT_ROLE)?;

        let decompressed = store.scratch_path("pdf");
        run_expecting_output(
            &self.tool,
            Command::new(&self.tool)
                .arg("--qdf")
                .arg("--object-streams=disable")
                .arg(&input)
                .arg(&decompressed),
            &decompressed,
            "The watermark patch needs qpdf (apt install qpdf / brew install qpdf).",
        )?;

        let bytes = fs::read(&decompressed).map_err(|e| LongPdfError::Io {
            path: decompressed.clone(),
            source: e,
        })?;
        let (patched, replacements) = apply_patch_rules(&bytes);
        if replacements == 0 {
            debug!("no vendor patterns found; leaving the binary as-is");
            return Ok(());
        }
        debug!(replacements, "blanked vendor patterns");

        let patched_path = store.scratch_path("pdf");
        fs::write(&patched_path, &patched).map_err(|e| LongPdfError::Io {
            path: patched_path.clone(),
            source: e,
        })?;

        let recompressed = store.scratch_path("pdf");
        run_expecting_output(
            &self.tool,
            Command::new(&self.tool).arg(&patched_path).arg(&recompressed),
            &recompressed,
            "The watermark patch needs qpdf (apt install qpdf / brew install qpdf).",
        )?;

        store.adopt(DOCUMENT_ROLE, ArtifactFormat::PaginatedBinary, &recompressed)?;
        Ok(())
    }
}

impl Default for PatchStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for PatchStage {
    fn name(&self) -> &'static str {
        "patch-watermark"
    }

    fn input_format(&self) -> ArtifactFormat {
        ArtifactFormat::PaginatedBinary
    }

    fn output_format(&self) -> ArtifactFormat {
        ArtifactFormat::PaginatedBinary
    }

    fn run(&self, store: &ArtifactStore) -> Result<StageOutcome, LongPdfError> {
        match self.try_patch(store) {
            Ok(()) => Ok(StageOutcome::Completed),
            Err(e) => {
                warn!(error = %e, "watermark patch skipped");
                Ok(StageOutcome::Skipped {
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_rules_preserve_length() {
        let input: &[u8] =
            b"<< /URI (https://www.princexml.com/purchase/) /Producer (Prince 14.2) >>";
        let (patched, replacements) = apply_patch_rules(input);
        assert_eq!(patched.len(), input.len());
        assert_eq!(replacements, 2);
        assert!(!patched.windows(9).any(|w| w == b"princexml"));
        assert!(!patched.windows(6).any(|w| w == b"Prince"));
    }

    #[test]
    fn patch_rules_leave_clean_input_alone() {
        let input: &[u8] = b"<< /Producer (pandoc) /URI (https://example.org/a) >>";
        let (patched, replacements) = apply_patch_rules(input);
        assert_eq!(replacements, 0);
        assert_eq!(patched, input);
    }

    #[test]
    fn missing_tool_is_skipped_not_fatal() {
        let store = ArtifactStore::new().unwrap();
        store
            .write(DOCUMENT_ROLE, ArtifactFormat::PaginatedBinary, b"%PDF-1.4")
            .unwrap();
        let stage = PatchStage::with_tool("longpdf-no-such-qpdf-2f91");
        let outcome = stage.run(&store).unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped { .. }));
        // Artifact is untouched.
        assert_eq!(store.read(DOCUMENT_ROLE).unwrap(), b"%PDF-1.4");
    }
}
