//! Page-fit render stage: the core algorithm of the crate.
//!
//! ## The chicken-and-egg problem
//!
//! The layout renderer needs a page height to render *into* before any
//! geometry is knowable, but the height we want *is* that geometry. The
//! loop resolves this in three phases:
//!
//! 1. **Grow** — render at oversized trial heights (10 m, 100 m, 1000 m by
//!    default), ascending, until the content collapses onto a single page.
//!    The candidate list is also the backstop: exhausting it ends the loop
//!    with a reported multi-page result rather than growing forever.
//! 2. **Measure** — on the first single-page render, find the lowest text
//!    position and convert `page_height − lowest_y` from points to
//!    millimetres, rounded **up** to the next whole millimetre. A sentinel
//!    paragraph carrying a random token is injected at the end of the body
//!    before every trial render, so even documents whose real content ends
//!    in zero-height elements produce a trustworthy lower bound, and the
//!    sentinel's own footprint doubles as a small bottom safety margin.
//! 3. **Finalize** — re-render the sentinel-free document at the fitted
//!    height. This render is the stage output and is not re-measured:
//!    removing trailing content cannot increase the required height.
//!
//! Page geometry reaches the renderer through an injected `@page` style
//! block; the bottom margin is folded into the page height because the
//! fitted page already ends exactly at the content bottom.

use crate::artifact::{ArtifactFormat, ArtifactStore};
use crate::config::FitConfig;
use crate::error::LongPdfError;
use crate::exec::run_expecting_output;
use crate::inspect;
use crate::pipeline::{Stage, StageOutcome, DOCUMENT_ROLE};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Exact points-per-millimetre conversion, used in both directions.
pub const PTS_PER_MM: f64 = 72.0 / 25.4;

/// Page geometry handed to a [`PdfRenderer`] for one render.
#[derive(Debug, Clone, Serialize)]
pub struct PageSpec {
    pub width_mm: f64,
    /// Content page height; the rendered page is this plus the bottom
    /// margin (see [`PageSpec::style_block`]).
    pub height_mm: f64,
    pub margin_top_mm: f64,
    pub margin_right_mm: f64,
    pub margin_bottom_mm: f64,
    pub margin_left_mm: f64,
}

impl PageSpec {
    /// The `@page` style block communicating this geometry to the layout
    /// engine. The bottom margin is folded into the page height and the
    /// declared bottom margin zeroed, so content may run to the fitted
    /// height exactly while the page still ends with blank space below it.
    pub fn style_block(&self) -> String {
        format!(
            "<style>\n@page {{\n  size: {}mm {}mm;\n  margin: {}mm {}mm 0mm {}mm;\n}}\n</style>",
            self.width_mm,
            self.height_mm + self.margin_bottom_mm,
            self.margin_top_mm,
            self.margin_right_mm,
            self.margin_left_mm,
        )
    }
}

/// The seam to the out-of-process layout engine.
///
/// `input_html` already contains the page-geometry style block for `spec`;
/// the spec is passed alongside for renderers that take geometry as
/// arguments instead.
pub trait PdfRenderer {
    fn render(
        &self,
        input_html: &Path,
        output_pdf: &Path,
        spec: &PageSpec,
    ) -> Result<(), LongPdfError>;
}

const PRINCE_HINT: &str = "PDF rendering needs Prince.\n\
     Download it from https://www.princexml.com/download/ (free for personal use).";

/// Production [`PdfRenderer`]: shells out to `prince`.
///
/// Geometry travels in the injected `@page` style, so the CLI call is just
/// input and output.
pub struct PrinceRenderer;

impl PdfRenderer for PrinceRenderer {
    fn render(
        &self,
        input_html: &Path,
        output_pdf: &Path,
        _spec: &PageSpec,
    ) -> Result<(), LongPdfError> {
        run_expecting_output(
            "prince",
            Command::new("prince")
                .arg(input_html)
                .arg("-o")
                .arg(output_pdf),
            output_pdf,
            PRINCE_HINT,
        )
    }
}

/// One grow-phase render and its observed page count.
#[derive(Debug, Clone, Serialize)]
pub struct FitTrial {
    pub height_mm: f64,
    pub page_count: usize,
}

/// Measurement record of a completed fit.
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    /// Final page height in millimetres (content height rounded up, or
    /// the largest grow candidate when the content never fit one page).
    pub fitted_height_mm: f64,
    /// Measured content bottom in millimetres, before rounding. Absent
    /// when no single-page trial succeeded.
    pub content_bottom_mm: Option<f64>,
    /// Whether the content collapsed onto a single page.
    pub single_page: bool,
    /// Grow-phase renders in order; never longer than the candidate list.
    pub trials: Vec<FitTrial>,
    /// The sentinel token used for this run, for output verification.
    pub sentinel_token: String,
}

/// StructuredMarkup → PaginatedBinary stage running the grow / measure /
/// finalize loop.
pub struct FitStage {
    config: FitConfig,
    renderer: Box<dyn PdfRenderer>,
}

impl FitStage {
    pub fn new(config: FitConfig, renderer: Box<dyn PdfRenderer>) -> Self {
        Self { config, renderer }
    }

    fn page_spec(&self, height_mm: f64) -> PageSpec {
        PageSpec {
            width_mm: self.config.page_width_mm,
            height_mm,
            margin_top_mm: self.config.margin_top_mm,
            margin_right_mm: self.config.margin_right_mm,
            margin_bottom_mm: self.config.margin_bottom_mm,
            margin_left_mm: self.config.margin_left_mm,
        }
    }

    /// Render `html` at `spec` into a fresh scratch PDF.
    fn render_trial(
        &self,
        store: &ArtifactStore,
        html: &str,
        spec: &PageSpec,
    ) -> Result<PathBuf, LongPdfError> {
        let styled = inject_page_style(html, spec);
        let html_path = store.scratch_path("html");
        fs::write(&html_path, styled).map_err(|e| LongPdfError::Io {
            path: html_path.clone(),
            source: e,
        })?;
        let pdf_path = store.scratch_path("pdf");
        self.renderer.render(&html_path, &pdf_path, spec)?;
        Ok(pdf_path)
    }
}

impl Stage for FitStage {
    fn name(&self) -> &'static str {
        "fit-render"
    }

    fn input_format(&self) -> ArtifactFormat {
        ArtifactFormat::StructuredMarkup
    }

    fn output_format(&self) -> ArtifactFormat {
        ArtifactFormat::PaginatedBinary
    }

    fn run(&self, store: &ArtifactStore) -> Result<StageOutcome, LongPdfError> {
        let html = String::from_utf8_lossy(&store.read(DOCUMENT_ROLE)?).into_owned();

        // The sentinel only ever exists in scratch renders; the staged
        // artifact is never written with it, so it cannot leak forward.
        let token = Uuid::new_v4().simple().to_string();
        let probed_html = inject_sentinel(&html, &sentinel_markup(&token));

        // ── Grow phase ───────────────────────────────────────────────────
        let mut trials = Vec::new();
        let mut single_page_pdf = None;
        for &height_mm in &self.config.grow_candidates_mm {
            let spec = self.page_spec(height_mm);
            let pdf = self.render_trial(store, &probed_html, &spec)?;
            let pages = inspect::page_count(&pdf)?;
            debug!(height_mm, pages, "grow trial");
            trials.push(FitTrial {
                height_mm,
                page_count: pages,
            });
            if pages == 1 {
                single_page_pdf = Some(pdf);
                break;
            }
        }

        // ── Measure phase ────────────────────────────────────────────────
        let (fitted_height_mm, content_bottom_mm, single_page) = match &single_page_pdf {
            Some(pdf) => {
                let samples = inspect::measure(pdf)?;
                let page = samples.first().ok_or_else(|| LongPdfError::MalformedPdf {
                    path: pdf.clone(),
                    detail: "document has no pages".into(),
                })?;
                let lowest_y = page
                    .text_blocks
                    .iter()
                    .map(|b| b.y0.min(b.y1))
                    .fold(f64::INFINITY, f64::min);
                let content_bottom_pts = if lowest_y.is_finite() {
                    page.height_pts - lowest_y
                } else {
                    // No text at all; fall back to the top margin.
                    self.config.margin_top_mm * PTS_PER_MM
                };
                let content_bottom_mm = content_bottom_pts / PTS_PER_MM;
                (content_bottom_mm.ceil(), Some(content_bottom_mm), true)
            }
            None => {
                let tallest = *self
                    .config
                    .grow_candidates_mm
                    .last()
                    .expect("validated non-empty");
                warn!(
                    candidates = self.config.grow_candidates_mm.len(),
                    tallest_mm = tallest,
                    "content still spans multiple pages after the largest trial height"
                );
                (tallest, None, false)
            }
        };

        // ── Finalize phase ───────────────────────────────────────────────
        // Sentinel-free render at the fitted height; trusted without
        // re-measuring, since dropping trailing content can only leave
        // equal or less to paginate.
        let spec = self.page_spec(fitted_height_mm);
        let final_pdf = self.render_trial(store, &html, &spec)?;
        store.adopt(DOCUMENT_ROLE, ArtifactFormat::PaginatedBinary, &final_pdf)?;

        info!(fitted_height_mm, single_page, "page fitted");
        Ok(StageOutcome::Fitted(FitReport {
            fitted_height_mm,
            content_bottom_mm,
            single_page,
            trials,
            sentinel_token: token,
        }))
    }
}

/// The sentinel element: a paragraph whose text is the random token.
/// Unpredictable enough not to collide with real content, and rendered as
/// real text so the layout inspector sees it as the lowest block.
fn sentinel_markup(token: &str) -> String {
    format!("<p id=\"{token}\">{token}</p>")
}

/// Insert `marker` at the very end of the body content.
fn inject_sentinel(html: &str, marker: &str) -> String {
    match find_ignore_case(html, "</body>") {
        Some(at) => format!("{}{marker}\n{}", &html[..at], &html[at..]),
        None => format!("{html}\n{marker}\n"),
    }
}

/// Insert the `@page` style block for `spec` into the document head.
fn inject_page_style(html: &str, spec: &PageSpec) -> String {
    let style = spec.style_block();
    if let Some(at) = find_ignore_case(html, "</head>") {
        return format!("{}{style}\n{}", &html[..at], &html[at..]);
    }
    if let Some(at) = find_ignore_case(html, "<body") {
        return format!("{}{style}\n{}", &html[..at], &html[at..]);
    }
    format!("{style}\n{html}")
}

/// Byte offset of the first ASCII-case-insensitive occurrence of `needle`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}
