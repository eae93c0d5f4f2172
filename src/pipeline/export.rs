//! Notebook export stage: `.ipynb` → Markdown via `jupyter nbconvert`.
//!
//! The export runs inside the staging root so the images nbconvert
//! extracts land next to the exported Markdown. The markup stage later
//! uses the staging root as its resource path, which is how those images
//! survive into the rendered HTML.

use crate::artifact::{ArtifactFormat, ArtifactStore};
use crate::error::LongPdfError;
use crate::exec::run_expecting_output;
use crate::pipeline::{Stage, StageOutcome, DOCUMENT_ROLE};
use std::fs;
use std::process::Command;
use uuid::Uuid;

const JUPYTER_HINT: &str =
    "Notebook export needs Jupyter's nbconvert.\nInstall it with: pip install nbconvert";

/// Raw → Markup stage shelling out to `jupyter nbconvert`.
pub struct NotebookExportStage;

impl NotebookExportStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NotebookExportStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for NotebookExportStage {
    fn name(&self) -> &'static str {
        "export-notebook"
    }

    fn input_format(&self) -> ArtifactFormat {
        ArtifactFormat::Raw
    }

    fn output_format(&self) -> ArtifactFormat {
        ArtifactFormat::Markup
    }

    fn run(&self, store: &ArtifactStore) -> Result<StageOutcome, LongPdfError> {
        // nbconvert decides the exporter by extension, so stage a scratch
        // copy under an .ipynb name.
        let notebook = store.read(DOCUMENT_ROLE)?;
        let scratch_nb = store.scratch_path("ipynb");
        fs::write(&scratch_nb, &notebook).map_err(|e| LongPdfError::Io {
            path: scratch_nb.clone(),
            source: e,
        })?;

        let stem = format!("export-{}", Uuid::new_v4().simple());
        let exported = store.root().join(format!("{stem}.md"));
        run_expecting_output(
            "jupyter",
            Command::new("jupyter")
                .arg("nbconvert")
                .arg("--to")
                .arg("markdown")
                .arg(&scratch_nb)
                .arg("--output")
                .arg(&stem)
                .arg("--output-dir")
                .arg(store.root()),
            &exported,
            JUPYTER_HINT,
        )?;

        store.adopt(DOCUMENT_ROLE, ArtifactFormat::Markup, &exported)?;
        Ok(StageOutcome::Completed)
    }
}
