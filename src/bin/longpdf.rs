//! CLI binary for longpdf.
//!
//! A thin shim over the library crate that maps CLI flags to `FitConfig`,
//! prompts for missing arguments, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use longpdf::{convert_to, FitConfig};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Fit a Markdown document; PDF lands next to the input
  longpdf "Assignment 1.md"

  # Choose the output location (file or directory)
  longpdf notes.md -o out/notes.pdf
  longpdf notes.md -o ~/Documents/PDF/

  # Narrower page, tighter margins
  longpdf --width 180 --margin 10 cheatsheet.md

  # Convert an exported notebook
  longpdf analysis.ipynb

  # A pre-rendered HTML page straight to the fitting loop
  longpdf report.html

  # Machine-readable conversion report
  longpdf notes.md --json

  # No arguments: prompts for the paths interactively
  longpdf

EXTERNAL TOOLS (looked up on PATH):
  pandoc     Markdown -> HTML            required for .md and .ipynb inputs
             https://pandoc.org/installing.html
  prince     HTML -> PDF layout engine   always required
             https://www.princexml.com/download/  (free for personal use)
  jupyter    notebook export             required for .ipynb inputs
             pip install nbconvert
  qpdf       watermark patch             optional; the patch is skipped
             apt install qpdf            without it

ENVIRONMENT VARIABLES:
  LONGPDF_OUTPUT      Default output path or directory
  LONGPDF_PAGE_WIDTH  Page width in mm
  LONGPDF_MARGIN      Uniform margin in mm
  LONGPDF_TITLE       Document title for the HTML head
  LONGPDF_NO_PATCH    Disable the watermark patch
  LONGPDF_JSON        Emit the JSON report
  LONGPDF_VERBOSE     Debug-level logs
  LONGPDF_QUIET       Errors only
"#;

/// Fit Markdown, HTML, or Jupyter documents onto one exactly-sized PDF page.
#[derive(Parser, Debug)]
#[command(
    name = "longpdf",
    version,
    about = "Fit Markdown, HTML, or Jupyter documents onto one exactly-sized PDF page",
    long_about = "Convert a Markdown, HTML, or Jupyter document into a single-page PDF whose \
page height exactly fits the rendered content: render oversized, measure where the content \
ends, render once more at exactly that height.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input file (.md, .markdown, .html, .htm, .xhtml, .ipynb).
    /// Prompted for interactively when omitted.
    input: Option<PathBuf>,

    /// Output PDF file or directory. Default: alongside the input.
    #[arg(short, long, env = "LONGPDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Page width in millimetres.
    #[arg(long, env = "LONGPDF_PAGE_WIDTH", default_value_t = 210.0)]
    width: f64,

    /// Uniform margin in millimetres (all four sides).
    #[arg(long, env = "LONGPDF_MARGIN", default_value_t = 15.0)]
    margin: f64,

    /// Top margin override in millimetres.
    #[arg(long)]
    margin_top: Option<f64>,

    /// Right margin override in millimetres.
    #[arg(long)]
    margin_right: Option<f64>,

    /// Bottom margin override in millimetres.
    #[arg(long)]
    margin_bottom: Option<f64>,

    /// Left margin override in millimetres.
    #[arg(long)]
    margin_left: Option<f64>,

    /// Document title for the HTML head. Default: the input file's stem.
    #[arg(long, env = "LONGPDF_TITLE")]
    title: Option<String>,

    /// Directory for resolving relative images and stylesheets.
    #[arg(long)]
    resource_dir: Option<PathBuf>,

    /// Skip the cosmetic watermark patch.
    #[arg(long, env = "LONGPDF_NO_PATCH")]
    no_patch: bool,

    /// Print the conversion report as JSON instead of the summary lines.
    #[arg(long, env = "LONGPDF_JSON")]
    json: bool,

    /// Enable DEBUG-level logs.
    #[arg(short, long, env = "LONGPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "LONGPDF_QUIET")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    // ── Resolve arguments, prompting when the input is missing ───────────
    let (input, output) = match cli.input.clone() {
        Some(input) => (input, cli.output.clone()),
        None => {
            let (input, prompted_output) = prompt_for_paths()?;
            (input, cli.output.clone().or(prompted_output))
        }
    };

    let config = build_config(&cli)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let report = match convert_to(&input, output.as_deref(), &config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {e}", red("✗"));
            std::process::exit(1);
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    if !cli.quiet {
        eprintln!(
            "{} PDF generated into {}",
            green("✔"),
            bold(&report.output.display().to_string())
        );
        if let Some(fit) = &report.fit {
            eprintln!(
                "   {}  {}",
                dim(&format!("fitted height: {} mm", fit.fitted_height_mm)),
                dim(&format!(
                    "{} render trial{}",
                    fit.trials.len(),
                    if fit.trials.len() == 1 { "" } else { "s" }
                )),
            );
            if !fit.single_page {
                eprintln!(
                    "{} content still spans multiple pages at the largest trial height \
                     ({} mm); the output is not single-page",
                    yellow("⚠"),
                    fit.fitted_height_mm
                );
            }
        }
    }

    Ok(())
}

/// Interactive fallback when no input argument was given.
fn prompt_for_paths() -> Result<(PathBuf, Option<PathBuf>)> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    eprint!("Enter the path of your md/html/ipynb file: ");
    io::stderr().flush().ok();
    let input = lines
        .next()
        .transpose()
        .context("Failed to read from stdin")?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .context("No input file given")?;

    eprint!("Enter the directory for the produced PDF (blank = alongside the input): ");
    io::stderr().flush().ok();
    let output = lines
        .next()
        .transpose()
        .context("Failed to read from stdin")?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    Ok((PathBuf::from(input), output))
}

/// Map CLI args to `FitConfig`.
fn build_config(cli: &Cli) -> Result<FitConfig> {
    let mut builder = FitConfig::builder()
        .page_width_mm(cli.width)
        .margins_mm(cli.margin)
        .patch_watermark(!cli.no_patch);

    if let Some(mm) = cli.margin_top {
        builder = builder.margin_top_mm(mm);
    }
    if let Some(mm) = cli.margin_right {
        builder = builder.margin_right_mm(mm);
    }
    if let Some(mm) = cli.margin_bottom {
        builder = builder.margin_bottom_mm(mm);
    }
    if let Some(mm) = cli.margin_left {
        builder = builder.margin_left_mm(mm);
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }
    if let Some(ref dir) = cli.resource_dir {
        builder = builder.resource_dir(dir.clone());
    }

    builder.build().context("Invalid configuration")
}
