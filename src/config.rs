//! Configuration types for the fit-to-one-page conversion.
//!
//! All behaviour is controlled through [`FitConfig`], built via its
//! [`FitConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share a config across batch conversions and to diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A ten-field constructor is unreadable and breaks on every new field. The
//! builder lets callers set only what they care about and rely on documented
//! defaults for the rest.

use crate::artifact::ArtifactFormat;
use crate::error::LongPdfError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// The input document kinds the pipeline accepts, determined by file
/// extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputFormat {
    /// `.md` / `.markdown`
    Markdown,
    /// `.html` / `.htm` / `.xhtml` — pre-rendered structured markup.
    Html,
    /// `.ipynb` — exported to Markdown before the markup pipeline.
    Notebook,
}

impl InputFormat {
    /// Determine the input format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, LongPdfError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md") | Some("markdown") => Ok(InputFormat::Markdown),
            Some("html") | Some("htm") | Some("xhtml") => Ok(InputFormat::Html),
            Some("ipynb") => Ok(InputFormat::Notebook),
            _ => Err(LongPdfError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// The artifact format this input is staged under when a run begins.
    pub fn artifact_format(self) -> ArtifactFormat {
        match self {
            InputFormat::Markdown => ArtifactFormat::Markup,
            InputFormat::Html => ArtifactFormat::StructuredMarkup,
            InputFormat::Notebook => ArtifactFormat::Raw,
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputFormat::Markdown => "markdown",
            InputFormat::Html => "html",
            InputFormat::Notebook => "notebook",
        };
        f.write_str(s)
    }
}

/// Configuration for a fit-to-one-page conversion.
///
/// Built via [`FitConfig::builder()`] or [`FitConfig::default()`].
///
/// # Example
/// ```rust
/// use longpdf::FitConfig;
///
/// let config = FitConfig::builder()
///     .page_width_mm(180.0)
///     .margins_mm(10.0)
///     .title("Assignment 1")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Output page width in millimetres. Default: 210 (A4 width).
    pub page_width_mm: f64,

    /// Top margin in millimetres. Default: 15.
    pub margin_top_mm: f64,

    /// Right margin in millimetres. Default: 15.
    pub margin_right_mm: f64,

    /// Bottom margin in millimetres. Default: 15.
    ///
    /// Folded into the page height rather than declared to the renderer,
    /// since the fitted height already ends exactly at the content bottom.
    pub margin_bottom_mm: f64,

    /// Left margin in millimetres. Default: 15.
    pub margin_left_mm: f64,

    /// Trial page heights for the grow phase, in millimetres, ascending.
    /// Default: 10 m, 100 m, 1000 m.
    ///
    /// The fitting loop renders at each height in turn until the content
    /// collapses onto a single page. The list is also the loop's backstop:
    /// if the largest candidate still yields multiple pages, the run
    /// finishes with a reported multi-page result instead of growing
    /// forever.
    pub grow_candidates_mm: Vec<f64>,

    /// Document title passed to the markup converter. Defaults to the
    /// input file's stem when unset.
    pub title: Option<String>,

    /// Directory from which relative resources (images, stylesheets) are
    /// resolved during markup conversion. Defaults to the input file's
    /// directory, or the staging root for notebook inputs (their extracted
    /// images land there).
    pub resource_dir: Option<PathBuf>,

    /// Run the cosmetic watermark-neutralisation pass on the final PDF.
    /// Default: true. Failures in that pass never abort the pipeline.
    pub patch_watermark: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            page_width_mm: 210.0,
            margin_top_mm: 15.0,
            margin_right_mm: 15.0,
            margin_bottom_mm: 15.0,
            margin_left_mm: 15.0,
            grow_candidates_mm: vec![10_000.0, 100_000.0, 1_000_000.0],
            title: None,
            resource_dir: None,
            patch_watermark: true,
        }
    }
}

impl FitConfig {
    /// Create a new builder for `FitConfig`.
    pub fn builder() -> FitConfigBuilder {
        FitConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FitConfig`].
#[derive(Debug)]
pub struct FitConfigBuilder {
    config: FitConfig,
}

impl FitConfigBuilder {
    pub fn page_width_mm(mut self, mm: f64) -> Self {
        self.config.page_width_mm = mm.max(10.0);
        self
    }

    /// Set all four margins at once.
    pub fn margins_mm(mut self, mm: f64) -> Self {
        let mm = mm.max(0.0);
        self.config.margin_top_mm = mm;
        self.config.margin_right_mm = mm;
        self.config.margin_bottom_mm = mm;
        self.config.margin_left_mm = mm;
        self
    }

    pub fn margin_top_mm(mut self, mm: f64) -> Self {
        self.config.margin_top_mm = mm.max(0.0);
        self
    }

    pub fn margin_right_mm(mut self, mm: f64) -> Self {
        self.config.margin_right_mm = mm.max(0.0);
        self
    }

    pub fn margin_bottom_mm(mut self, mm: f64) -> Self {
        self.config.margin_bottom_mm = mm.max(0.0);
        self
    }

    pub fn margin_left_mm(mut self, mm: f64) -> Self {
        self.config.margin_left_mm = mm.max(0.0);
        self
    }

    pub fn grow_candidates_mm(mut self, candidates: Vec<f64>) -> Self {
        self.config.grow_candidates_mm = candidates;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.resource_dir = Some(dir.into());
        self
    }

    pub fn patch_watermark(mut self, v: bool) -> Self {
        self.config.patch_watermark = v;
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The grow candidates are sorted ascending and deduplicated so trial
    /// heights are monotonically non-decreasing across the fitting loop.
    pub fn build(mut self) -> Result<FitConfig, LongPdfError> {
        if self.config.grow_candidates_mm.is_empty() {
            return Err(LongPdfError::InvalidConfig(
                "At least one grow candidate height is required".into(),
            ));
        }
        if self
            .config
            .grow_candidates_mm
            .iter()
            .any(|&h| !h.is_finite() || h <= 0.0)
        {
            return Err(LongPdfError::InvalidConfig(
                "Grow candidate heights must be positive and finite".into(),
            ));
        }
        self.config
            .grow_candidates_mm
            .sort_by(|a, b| a.partial_cmp(b).expect("finite heights"));
        self.config.grow_candidates_mm.dedup();
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(
            InputFormat::from_path(Path::new("notes.md")).unwrap(),
            InputFormat::Markdown
        );
        assert_eq!(
            InputFormat::from_path(Path::new("Notes.MARKDOWN")).unwrap(),
            InputFormat::Markdown
        );
        assert_eq!(
            InputFormat::from_path(Path::new("page.htm")).unwrap(),
            InputFormat::Html
        );
        assert_eq!(
            InputFormat::from_path(Path::new("lab.ipynb")).unwrap(),
            InputFormat::Notebook
        );
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = InputFormat::from_path(Path::new("report.docx")).unwrap_err();
        assert!(matches!(err, LongPdfError::UnsupportedFormat { .. }));
        let err = InputFormat::from_path(Path::new("no_extension")).unwrap_err();
        assert!(matches!(err, LongPdfError::UnsupportedFormat { .. }));
    }

    #[test]
    fn builder_clamps_negative_margins() {
        let config = FitConfig::builder().margins_mm(-3.0).build().unwrap();
        assert_eq!(config.margin_top_mm, 0.0);
        assert_eq!(config.margin_bottom_mm, 0.0);
    }

    #[test]
    fn build_sorts_and_dedups_candidates() {
        let config = FitConfig::builder()
            .grow_candidates_mm(vec![500.0, 100.0, 500.0, 250.0])
            .build()
            .unwrap();
        assert_eq!(config.grow_candidates_mm, vec![100.0, 250.0, 500.0]);
    }

    #[test]
    fn build_rejects_empty_and_nonpositive_candidates() {
        assert!(FitConfig::builder()
            .grow_candidates_mm(vec![])
            .build()
            .is_err());
        assert!(FitConfig::builder()
            .grow_candidates_mm(vec![0.0])
            .build()
            .is_err());
    }
}
