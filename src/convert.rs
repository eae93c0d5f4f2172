//! Conversion entry points.
//!
//! The top-level functions tie everything together: detect the input
//! format, derive the destination path, seed the artifact store, run the
//! stage pipeline, and copy the terminal artifact to the destination.
//! The destination is written only from the final successful artifact, so
//! a failed run never leaves a partial or corrupt file there.

use crate::artifact::ArtifactStore;
use crate::config::{FitConfig, InputFormat};
use crate::error::LongPdfError;
use crate::pipeline::fit::{FitReport, PdfRenderer, PrinceRenderer};
use crate::pipeline::{build_pipeline, run_pipeline, StageReport, DOCUMENT_ROLE};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// What a conversion produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_format: InputFormat,
    /// One entry per executed stage, in order.
    pub stages: Vec<StageReport>,
    /// Fit measurement from the page-fit stage.
    pub fit: Option<FitReport>,
    pub duration_ms: u64,
}

/// Convert `input` to a single-page fitted PDF alongside the input file.
///
/// Equivalent to [`convert_to`] with no output path.
pub fn convert(input: &Path, config: &FitConfig) -> Result<ConversionReport, LongPdfError> {
    convert_to(input, None, config)
}

/// Convert `input` to a single-page fitted PDF.
///
/// `output` may be a file path (used as-is), an existing directory (the
/// PDF lands there under the input's stem), or `None` (the PDF lands next
/// to the input). An existing file at the destination is overwritten.
pub fn convert_to(
    input: &Path,
    output: Option<&Path>,
    config: &FitConfig,
) -> Result<ConversionReport, LongPdfError> {
    convert_with_renderer(input, output, config, Box::new(PrinceRenderer))
}

/// [`convert_to`] with a caller-supplied [`PdfRenderer`].
///
/// The seam that lets tests drive the whole pipeline without the real
/// layout engine installed.
pub fn convert_with_renderer(
    input: &Path,
    output: Option<&Path>,
    config: &FitConfig,
    renderer: Box<dyn PdfRenderer>,
) -> Result<ConversionReport, LongPdfError> {
    let started = Instant::now();

    if !input.exists() {
        return Err(LongPdfError::FileNotFound {
            path: input.to_path_buf(),
        });
    }
    let format = InputFormat::from_path(input)?;
    let destination = derive_output_path(input, output);
    info!(
        input = %input.display(),
        %format,
        destination = %destination.display(),
        "starting conversion"
    );

    let store = ArtifactStore::new()?;
    let bytes = fs::read(input).map_err(|e| LongPdfError::Io {
        path: input.to_path_buf(),
        source: e,
    })?;
    store.write(DOCUMENT_ROLE, format.artifact_format(), &bytes)?;

    let config = effective_config(input, format, config);
    let stages = build_pipeline(format, &config, renderer);
    let pipeline = run_pipeline(&stages, &store)?;

    let produced = store.path(DOCUMENT_ROLE)?;
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| LongPdfError::OutputWriteFailed {
                path: destination.clone(),
                source: e,
            })?;
        }
    }
    fs::copy(&produced, &destination).map_err(|e| LongPdfError::OutputWriteFailed {
        path: destination.clone(),
        source: e,
    })?;
    // `store` drops here, removing every staged artifact.

    let report = ConversionReport {
        input: input.to_path_buf(),
        output: destination,
        input_format: format,
        stages: pipeline.stages,
        fit: pipeline.fit,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        output = %report.output.display(),
        duration_ms = report.duration_ms,
        "conversion complete"
    );
    Ok(report)
}

/// Resolve the destination: explicit file, directory, or alongside the
/// input.
fn derive_output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    match output {
        None => input.with_extension("pdf"),
        Some(dir) if dir.is_dir() => {
            let mut name = stem;
            name.push(".pdf");
            dir.join(name)
        }
        Some(file) => file.to_path_buf(),
    }
}

/// Fill config defaults that depend on the input: the title falls back to
/// the file stem, the resource path to the input's directory (except for
/// notebooks, whose exported images live in the staging root).
fn effective_config(input: &Path, format: InputFormat, config: &FitConfig) -> FitConfig {
    let mut config = config.clone();
    if config.title.is_none() {
        config.title = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
    }
    if config.resource_dir.is_none() && format != InputFormat::Notebook {
        config.resource_dir = input.parent().map(Path::to_path_buf);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_defaults_to_alongside_input() {
        let out = derive_output_path(Path::new("/docs/Assignment 1.md"), None);
        assert_eq!(out, Path::new("/docs/Assignment 1.pdf"));
    }

    #[test]
    fn output_directory_gets_input_stem() {
        let dir = tempfile::tempdir().unwrap();
        let out = derive_output_path(Path::new("/docs/notes.md"), Some(dir.path()));
        assert_eq!(out, dir.path().join("notes.pdf"));
    }

    #[test]
    fn explicit_file_path_is_used_verbatim() {
        let out = derive_output_path(
            Path::new("/docs/notes.md"),
            Some(Path::new("/elsewhere/final.pdf")),
        );
        assert_eq!(out, Path::new("/elsewhere/final.pdf"));
    }

    #[test]
    fn missing_input_is_file_not_found() {
        let err = convert(Path::new("/definitely/not/here.md"), &FitConfig::default())
            .unwrap_err();
        assert!(matches!(err, LongPdfError::FileNotFound { .. }), "{err}");
    }

    #[test]
    fn effective_config_fills_title_and_resources() {
        let config = effective_config(
            Path::new("/docs/notes.md"),
            InputFormat::Markdown,
            &FitConfig::default(),
        );
        assert_eq!(config.title.as_deref(), Some("notes"));
        assert_eq!(config.resource_dir.as_deref(), Some(Path::new("/docs")));
    }

    #[test]
    fn notebook_resources_stay_in_staging_root() {
        let config = effective_config(
            Path::new("/docs/lab.ipynb"),
            InputFormat::Notebook,
            &FitConfig::default(),
        );
        assert_eq!(config.resource_dir, None);
    }
}
