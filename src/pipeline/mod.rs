//! Pipeline stages and their orchestration.
//!
//! Each submodule implements exactly one transformation over the staged
//! document artifact. Keeping stages separate makes each independently
//! testable and lets us swap implementations (e.g. a different layout
//! renderer) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! .ipynb ─▶ export ─┐
//!                   ├─▶ rewrite ─▶ markup ─▶ fit ─▶ patch
//! .md ──────────────┘  (wikilinks,  (pandoc)  (grow/   (qpdf,
//!                       anchors)              measure/  cosmetic)
//! .html ────────────────────────────────────▶ finalize)
//! ```
//!
//! 1. [`export`]  — notebook → Markdown via `jupyter nbconvert`
//! 2. [`rewrite`] — pure text rules: wikilinks, section-anchor slugs
//! 3. [`markup`]  — Markdown → standalone HTML via `pandoc`
//! 4. [`fit`]     — the page-fit render loop; the core of the crate
//! 5. [`patch`]   — cosmetic watermark neutralisation; never fatal
//!
//! Execution is strictly sequential: every stage depends on its
//! predecessor's output, and the external renderers are synchronous
//! processes, so there is nothing to parallelise within one run.

pub mod export;
pub mod fit;
pub mod markup;
pub mod patch;
pub mod rewrite;

use crate::artifact::{ArtifactFormat, ArtifactStore};
use crate::config::{FitConfig, InputFormat};
use crate::error::LongPdfError;
use fit::{FitReport, FitStage, PdfRenderer};
use serde::Serialize;
use tracing::info;

/// Role under which the document travels through the pipeline.
pub const DOCUMENT_ROLE: &str = "document";

/// One transformation step: declared input format, declared output format,
/// and the behaviour between them.
///
/// A capability trait rather than a class hierarchy: the orchestrator
/// holds `Box<dyn Stage>` and knows nothing about which variant it runs.
pub trait Stage {
    /// Stable stage name used in logs and failure diagnostics.
    fn name(&self) -> &'static str;

    /// Artifact format this stage consumes.
    fn input_format(&self) -> ArtifactFormat;

    /// Artifact format this stage produces.
    fn output_format(&self) -> ArtifactFormat;

    /// Transform the store's current document artifact.
    fn run(&self, store: &ArtifactStore) -> Result<StageOutcome, LongPdfError>;
}

/// What a stage did.
///
/// `Skipped` exists so the one cosmetic stage can decline to run without
/// aborting the pipeline: soft failure is a value, not a swallowed error.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// The stage transformed the artifact.
    Completed,
    /// The page-fit stage completed, with its measurement report.
    Fitted(FitReport),
    /// A best-effort stage declined to run; the artifact is unchanged.
    Skipped { reason: String },
}

/// Status of one executed stage, for reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Fitted,
    Skipped { reason: String },
}

/// Per-stage entry in a [`PipelineReport`].
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
}

/// Result of a full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// One entry per executed stage, in order.
    pub stages: Vec<StageReport>,
    /// The fit measurement, when a page-fit stage ran.
    pub fit: Option<FitReport>,
}

/// Select the stage sequence for an input format.
///
/// * notebook → export, rewrite…, markup, fit, patch
/// * markdown → rewrite…, markup, fit, patch
/// * html     → fit, patch
///
/// The patch stage is appended only when
/// [`FitConfig::patch_watermark`] is set.
pub fn build_pipeline(
    format: InputFormat,
    config: &FitConfig,
    renderer: Box<dyn PdfRenderer>,
) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = Vec::new();

    if format == InputFormat::Notebook {
        stages.push(Box::new(export::NotebookExportStage::new()));
    }
    if matches!(format, InputFormat::Notebook | InputFormat::Markdown) {
        stages.push(Box::new(rewrite::StripWikilinksStage));
        stages.push(Box::new(rewrite::SlugifyAnchorsStage));
        stages.push(Box::new(markup::MarkupStage::new(
            config.title.clone(),
            config.resource_dir.clone(),
        )));
    }
    stages.push(Box::new(FitStage::new(config.clone(), renderer)));
    if config.patch_watermark {
        stages.push(Box::new(patch::PatchStage::new()));
    }
    stages
}

/// Execute `stages` sequentially over `store`.
///
/// Before each stage the store's current artifact format is checked
/// against the stage's declared input; a mismatch is a configuration
/// error ([`LongPdfError::PipelineMismatch`]), not a condition to recover
/// from. The first fatal error aborts the remaining sequence with the
/// failing stage's name attached; the store's scoped teardown still
/// removes every staged artifact.
pub fn run_pipeline(
    stages: &[Box<dyn Stage>],
    store: &ArtifactStore,
) -> Result<PipelineReport, LongPdfError> {
    let mut report = PipelineReport {
        stages: Vec::with_capacity(stages.len()),
        fit: None,
    };

    for stage in stages {
        let found = store
            .format(DOCUMENT_ROLE)
            .ok_or_else(|| LongPdfError::ArtifactNotFound {
                role: DOCUMENT_ROLE.into(),
            })?;
        if found != stage.input_format() {
            return Err(LongPdfError::PipelineMismatch {
                stage: stage.name(),
                expected: stage.input_format(),
                found,
            });
        }

        info!(stage = stage.name(), "running stage");
        let outcome = stage.run(store).map_err(|e| LongPdfError::StageFailed {
            stage: stage.name(),
            source: Box::new(e),
        })?;

        let status = match outcome {
            StageOutcome::Completed => StageStatus::Completed,
            StageOutcome::Fitted(fit) => {
                report.fit = Some(fit);
                StageStatus::Fitted
            }
            StageOutcome::Skipped { reason } => {
                info!(stage = stage.name(), reason = %reason, "stage skipped");
                StageStatus::Skipped { reason }
            }
        };
        report.stages.push(StageReport {
            name: stage.name().to_string(),
            status,
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopStage;

    impl Stage for NoopStage {
        fn name(&self) -> &'static str {
            "noop"
        }
        fn input_format(&self) -> ArtifactFormat {
            ArtifactFormat::Markup
        }
        fn output_format(&self) -> ArtifactFormat {
            ArtifactFormat::Markup
        }
        fn run(&self, _store: &ArtifactStore) -> Result<StageOutcome, LongPdfError> {
            Ok(StageOutcome::Completed)
        }
    }

    #[test]
    fn mismatched_input_format_is_a_configuration_error() {
        let store = ArtifactStore::new().unwrap();
        store
            .write(DOCUMENT_ROLE, ArtifactFormat::PaginatedBinary, b"%PDF-")
            .unwrap();
        let stages: Vec<Box<dyn Stage>> = vec![Box::new(NoopStage)];
        let err = run_pipeline(&stages, &store).unwrap_err();
        assert!(matches!(err, LongPdfError::PipelineMismatch { .. }), "{err}");
    }

    #[test]
    fn empty_store_is_a_wiring_error() {
        let store = ArtifactStore::new().unwrap();
        let stages: Vec<Box<dyn Stage>> = vec![Box::new(NoopStage)];
        let err = run_pipeline(&stages, &store).unwrap_err();
        assert!(matches!(err, LongPdfError::ArtifactNotFound { .. }), "{err}");
    }

    #[test]
    fn stage_failure_carries_the_stage_name() {
        struct FailingStage;
        impl Stage for FailingStage {
            fn name(&self) -> &'static str {
                "always-fails"
            }
            fn input_format(&self) -> ArtifactFormat {
                ArtifactFormat::Markup
            }
            fn output_format(&self) -> ArtifactFormat {
                ArtifactFormat::Markup
            }
            fn run(&self, _store: &ArtifactStore) -> Result<StageOutcome, LongPdfError> {
                Err(LongPdfError::InvalidConfig("boom".into()))
            }
        }

        let store = ArtifactStore::new().unwrap();
        store
            .write(DOCUMENT_ROLE, ArtifactFormat::Markup, b"# t\n")
            .unwrap();
        let stages: Vec<Box<dyn Stage>> = vec![Box::new(FailingStage)];
        let err = run_pipeline(&stages, &store).unwrap_err();
        match err {
            LongPdfError::StageFailed { stage, .. } => assert_eq!(stage, "always-fails"),
            other => panic!("expected StageFailed, got {other}"),
        }
    }
}
