//! Markup conversion stage: Markdown → standalone HTML via `pandoc`.
//!
//! A pure boundary adapter around pandoc's CLI. The HTML is produced
//! standalone with embedded resources so the layout renderer sees a
//! self-contained document, and with MathML so formulae survive without a
//! JavaScript math engine.

use crate::artifact::{ArtifactFormat, ArtifactStore};
use crate::error::LongPdfError;
use crate::exec::run_expecting_output;
use crate::pipeline::{Stage, StageOutcome, DOCUMENT_ROLE};
use std::path::PathBuf;
use std::process::Command;

const PANDOC_HINT: &str =
    "Markup conversion needs pandoc.\nInstall it from https://pandoc.org/installing.html \
     (e.g. apt install pandoc / brew install pandoc).";

/// Markup → StructuredMarkup stage shelling out to `pandoc`.
pub struct MarkupStage {
    title: Option<String>,
    resource_dir: Option<PathBuf>,
}

impl MarkupStage {
    /// `title` lands in the HTML head; `resource_dir` is where relative
    /// images resolve from. With no resource dir the staging root is used
    /// (the notebook exporter extracts its images there).
    pub fn new(title: Option<String>, resource_dir: Option<PathBuf>) -> Self {
        Self {
            title,
            resource_dir,
        }
    }
}

impl Stage for MarkupStage {
    fn name(&self) -> &'static str {
        "markup-to-html"
    }

    fn input_format(&self) -> ArtifactFormat {
        ArtifactFormat::Markup
    }

    fn output_format(&self) -> ArtifactFormat {
        ArtifactFormat::StructuredMarkup
    }

    fn run(&self, store: &ArtifactStore) -> Result<StageOutcome, LongPdfError> {
        let input = store.path(DOCUMENT_ROLE)?;
        let output = store.scratch_path("html");
        let resources = self
            .resource_dir
            .clone()
            .unwrap_or_else(|| store.root().to_path_buf());

        let mut command = Command::new("pandoc");
        command
            .arg("--standalone")
            .arg("--embed-resources")
            .arg("--mathml")
            .args(["-f", "markdown", "-t", "html"])
            .arg(format!(
                "--metadata=title={}",
                self.title.as_deref().unwrap_or("Document")
            ))
            .arg(format!("--resource-path={}", resources.display()))
            .arg(&input)
            .arg("-o")
            .arg(&output);

        run_expecting_output("pandoc", &mut command, &output, PANDOC_HINT)?;
        store.adopt(DOCUMENT_ROLE, ArtifactFormat::StructuredMarkup, &output)?;
        Ok(StageOutcome::Completed)
    }
}
