//! Markdown rewrite stages: wikilinks and section-anchor slugs.
//!
//! Two cheap, deterministic text passes that run before the markup
//! converter sees the document:
//!
//! * `[[Target]]` / `[[Target|Label]]` wikilinks become standard inline
//!   links, since the converter does not understand wiki syntax.
//! * `#Section` fragments in link URLs are slugified to match the anchor
//!   ids the HTML converter generates for headings; otherwise
//!   intra-document links land nowhere in the rendered output.
//!
//! Each rule is a pure `&str → String` function with no shared state,
//! independently testable.

use crate::artifact::{ArtifactFormat, ArtifactStore};
use crate::error::LongPdfError;
use crate::pipeline::{Stage, StageOutcome, DOCUMENT_ROLE};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ── Rule 1: wikilinks → inline links ─────────────────────────────────────

static RE_WIKILINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[\s*([^\]\[|]+?)\s*(?:\|\s*([^\]\[]+?)\s*)?\]\]").unwrap());

// Splits `Page#Section` on the last unescaped `#`.
static RE_SECTION_TARGET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(|.*[^\\])#(.+)$").unwrap());

/// Rewrite `[[Target]]`, `[[Target|Label]]` and `[[Page#Section]]`
/// wikilinks as standard inline links.
///
/// With no explicit label, a section link is labelled by the section name
/// (`[[Page A#My Section]]` → `[My Section](Page A#my-section)`), a plain
/// link by its target.
pub fn strip_wikilinks(input: &str) -> String {
    RE_WIKILINK
        .replace_all(input, |caps: &Captures<'_>| {
            let target = caps.get(1).map_or("", |m| m.as_str());
            let explicit_label = caps.get(2).map(|m| m.as_str());
            if let Some(section) = RE_SECTION_TARGET.captures(target) {
                let page = section.get(1).map_or("", |m| m.as_str());
                let name = section.get(2).map_or("", |m| m.as_str());
                let label = explicit_label.unwrap_or(name);
                format!("[{label}]({page}#{})", slugify_fragment(name))
            } else {
                let label = explicit_label.unwrap_or(target);
                format!("[{label}]({target})")
            }
        })
        .into_owned()
}

// ── Rule 2: slugify `#fragment`s in inline links ─────────────────────────

static RE_FRAGMENT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^()#]*)#([^()]*)\)").unwrap());

/// Slugify the `#fragment` of every inline Markdown link so it matches
/// the HTML converter's heading anchors.
pub fn slugify_section_links(input: &str) -> String {
    RE_FRAGMENT_LINK
        .replace_all(input, |caps: &Captures<'_>| {
            format!(
                "[{}]({}#{})",
                &caps[1],
                &caps[2],
                slugify_fragment(&caps[3])
            )
        })
        .into_owned()
}

static RE_NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9 ]").unwrap());
static RE_SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());

/// Heading-anchor slug: non-alphanumerics stripped to spaces, space runs
/// to hyphens, lowercased. Applying it twice is a no-op.
pub fn slugify_fragment(fragment: &str) -> String {
    let spaced = RE_NON_ALNUM.replace_all(fragment, " ");
    RE_SPACE_RUN.replace_all(&spaced, "-").to_lowercase()
}

// ── Stages ───────────────────────────────────────────────────────────────

/// Markup → Markup stage applying [`strip_wikilinks`].
pub struct StripWikilinksStage;

impl Stage for StripWikilinksStage {
    fn name(&self) -> &'static str {
        "strip-wikilinks"
    }

    fn input_format(&self) -> ArtifactFormat {
        ArtifactFormat::Markup
    }

    fn output_format(&self) -> ArtifactFormat {
        ArtifactFormat::Markup
    }

    fn run(&self, store: &ArtifactStore) -> Result<StageOutcome, LongPdfError> {
        let text = String::from_utf8_lossy(&store.read(DOCUMENT_ROLE)?).into_owned();
        store.write(
            DOCUMENT_ROLE,
            ArtifactFormat::Markup,
            strip_wikilinks(&text).as_bytes(),
        )?;
        Ok(StageOutcome::Completed)
    }
}

/// Markup → Markup stage applying [`slugify_section_links`].
pub struct SlugifyAnchorsStage;

impl Stage for SlugifyAnchorsStage {
    fn name(&self) -> &'static str {
        "slugify-anchors"
    }

    fn input_format(&self) -> ArtifactFormat {
        ArtifactFormat::Markup
    }

    fn output_format(&self) -> ArtifactFormat {
        ArtifactFormat::Markup
    }

    fn run(&self, store: &ArtifactStore) -> Result<StageOutcome, LongPdfError> {
        let text = String::from_utf8_lossy(&store.read(DOCUMENT_ROLE)?).into_owned();
        store.write(
            DOCUMENT_ROLE,
            ArtifactFormat::Markup,
            slugify_section_links(&text).as_bytes(),
        )?;
        Ok(StageOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_wikilink() {
        assert_eq!(strip_wikilinks("see [[Page A]]"), "see [Page A](Page A)");
    }

    #[test]
    fn labelled_wikilink() {
        assert_eq!(
            strip_wikilinks("see [[Page A|over here]]"),
            "see [over here](Page A)"
        );
    }

    #[test]
    fn section_wikilink_uses_section_as_label() {
        assert_eq!(
            strip_wikilinks("see [[Page A#My Section]]"),
            "see [My Section](Page A#my-section)"
        );
    }

    #[test]
    fn labelled_section_wikilink() {
        assert_eq!(
            strip_wikilinks("[[Page A#My Section|details]]"),
            "[details](Page A#my-section)"
        );
    }

    #[test]
    fn same_page_section_wikilink() {
        assert_eq!(
            strip_wikilinks("[[#Results]]"),
            "[Results](#results)"
        );
    }

    #[test]
    fn surrounding_text_is_untouched() {
        let input = "before [[A]] middle [[B|b]] after";
        assert_eq!(strip_wikilinks(input), "before [A](A) middle [b](B) after");
    }

    #[test]
    fn no_wikilinks_passthrough() {
        let input = "plain text with a [link](url) and no wiki syntax";
        assert_eq!(strip_wikilinks(input), input);
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify_fragment("My Section"), "my-section");
        assert_eq!(slugify_fragment("Results & Discussion"), "results-discussion");
        assert_eq!(slugify_fragment("already-slugged"), "already-slugged");
    }

    #[test]
    fn slugify_is_idempotent() {
        let once = slugify_fragment("Qué pasa, N°5?");
        assert_eq!(slugify_fragment(&once), once);
    }

    #[test]
    fn inline_links_get_slugged_fragments() {
        assert_eq!(
            slugify_section_links("see [intro](Notes.md#First Part)"),
            "see [intro](Notes.md#first-part)"
        );
    }

    #[test]
    fn inline_links_without_fragment_are_untouched() {
        let input = "see [intro](Notes.md) and ![img](fig.png)";
        assert_eq!(slugify_section_links(input), input);
    }

    #[test]
    fn stage_round_trip_through_store() {
        let store = ArtifactStore::new().unwrap();
        store
            .write(
                DOCUMENT_ROLE,
                ArtifactFormat::Markup,
                b"intro [[Page A#My Section]] outro",
            )
            .unwrap();
        StripWikilinksStage.run(&store).unwrap();
        SlugifyAnchorsStage.run(&store).unwrap();
        let text = String::from_utf8(store.read(DOCUMENT_ROLE).unwrap()).unwrap();
        assert_eq!(text, "intro [My Section](Page A#my-section) outro");
    }
}
