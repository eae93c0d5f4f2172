//! # longpdf
//!
//! Fit an entire Markdown, HTML, or Jupyter document onto **one** PDF page
//! whose height exactly matches the content.
//!
//! ## Why this crate?
//!
//! Layout engines paginate: give them A4 and a long document comes back as
//! twelve pages with headings orphaned at page breaks. For notes, cheat
//! sheets, and scrollable hand-ins you often want the opposite: a single
//! page exactly as tall as the content, with no trailing blank space and
//! no accidental second page. No renderer exposes an "infinite canvas" mode,
//! so this crate drives one through a search loop instead: render
//! oversized, measure where the content actually ends, render once more at
//! exactly that height.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .ipynb ─▶ export ─┐
//!                   ├─▶ rewrite ─▶ markup ─▶ fit ─▶ patch ─▶ output.pdf
//! .md ──────────────┘  (wikilinks,  (pandoc)  (grow/   (qpdf,
//!                       anchors)              measure/  cosmetic)
//! .html ────────────────────────────────────▶ finalize)
//! ```
//!
//! The fit stage is the heart of it: inject a uniquely-tokenised sentinel
//! paragraph, render at 10 m / 100 m / 1000 m trial heights until the
//! content sits on one page, read the PDF's own layout geometry to find
//! the lowest text position, round up to whole millimetres, then render
//! the sentinel-free document once at the fitted height.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use longpdf::{convert, FitConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let report = convert(Path::new("Assignment 1.md"), &FitConfig::default())?;
//!     println!("wrote {}", report.output.display());
//!     if let Some(fit) = report.fit {
//!         println!("fitted height: {} mm", fit.fitted_height_mm);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## External tools
//!
//! The heavy lifting is delegated to out-of-process collaborators, looked
//! up on `PATH`:
//!
//! | Tool | Used for | Required |
//! |------|----------|----------|
//! | `pandoc` | Markdown → standalone HTML | for `.md` / `.ipynb` inputs |
//! | `prince` | HTML → paginated PDF | always |
//! | `jupyter` (nbconvert) | `.ipynb` → Markdown | for `.ipynb` inputs |
//! | `qpdf` | stream (de)compression for the watermark patch | optional |
//!
//! Only the PDF *reading* (page counts and text geometry for the fitting
//! loop) happens in-process, in [`inspect`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `longpdf` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! longpdf = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
pub mod convert;
pub mod error;
pub mod exec;
pub mod inspect;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{ArtifactFormat, ArtifactRef, ArtifactStore};
pub use config::{FitConfig, FitConfigBuilder, InputFormat};
pub use convert::{convert, convert_to, convert_with_renderer, ConversionReport};
pub use error::LongPdfError;
pub use inspect::{measure, page_count, BBox, PageGeometry};
pub use pipeline::fit::{
    FitReport, FitStage, FitTrial, PageSpec, PdfRenderer, PrinceRenderer, PTS_PER_MM,
};
pub use pipeline::{
    build_pipeline, run_pipeline, PipelineReport, Stage, StageOutcome, StageReport,
    StageStatus, DOCUMENT_ROLE,
};
