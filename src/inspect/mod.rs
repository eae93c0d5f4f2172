//! Layout inspector: per-page geometry of a paginated PDF.
//!
//! A deliberately small PDF reader sized for one job: telling the page-fit
//! loop how many pages the external renderer produced and where the lowest
//! text sits on the page. It brute-scans the file for `N G obj` markers
//! instead of trusting the cross-reference table (renderers and
//! post-processors disagree about xref styles; the object bodies are the
//! ground truth), resolves the page tree from the trailer's `/Root` or,
//! failing that, from any `/Type /Catalog` object, and walks each page's
//! content stream for text bounding boxes.
//!
//! ## Deliberate limits
//!
//! Classic (non-object-stream) files and `FlateDecode`-or-raw content
//! streams only. That covers what the HTML renderer and `qpdf` emit for
//! text content; anything outside it surfaces as
//! [`LongPdfError::MalformedPdf`] rather than a wrong measurement.

pub(crate) mod content;
pub(crate) mod object;

pub use content::BBox;

use crate::error::LongPdfError;
use flate2::read::ZlibDecoder;
use object::{ObjRef, Object, Parser};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Internal inspection failures; wrapped into
/// [`LongPdfError::MalformedPdf`] with the file path at the API boundary.
#[derive(Debug, Error)]
pub(crate) enum InspectError {
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("{0}")]
    Syntax(String),
    #[error("no indirect objects found")]
    NoObjects,
    #[error("no document catalog found")]
    NoCatalog,
    #[error("page tree is missing or cyclic")]
    BadPageTree,
    #[error("page {0} has no usable MediaBox")]
    NoMediaBox(usize),
    #[error("unsupported stream filter '{0}'")]
    UnsupportedFilter(String),
    #[error("stream decompression failed: {0}")]
    Decode(String),
}

/// Measured geometry of one page.
///
/// Derived data, produced fresh on each inspection; never cached across
/// renders.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageGeometry {
    /// Zero-based page index in document order.
    pub index: usize,
    /// Declared page width in points.
    pub width_pts: f64,
    /// Declared page height in points.
    pub height_pts: f64,
    /// One bounding box per text object on the page.
    pub text_blocks: Vec<BBox>,
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize, LongPdfError> {
    Ok(Document::load(path)?.page_count())
}

/// Per-page geometry of the PDF at `path`.
pub fn measure(path: &Path) -> Result<Vec<PageGeometry>, LongPdfError> {
    Document::load(path)?.measure()
}

/// A loaded PDF: object table plus the resolved page list.
pub struct Document {
    path: PathBuf,
    objects: HashMap<u32, Object>,
    pages: Vec<HashMap<String, Object>>,
    media_boxes: Vec<[f64; 4]>,
}

static RE_INDIRECT_OBJ: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)(\d{1,10})\s+(\d{1,5})\s+obj\b").unwrap());

impl Document {
    /// Load and index the PDF at `path`.
    pub fn load(path: &Path) -> Result<Self, LongPdfError> {
        let data = std::fs::read(path).map_err(|e| LongPdfError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(path, &data).map_err(|e| LongPdfError::MalformedPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    fn parse(path: &Path, data: &[u8]) -> Result<Self, InspectError> {
        let objects = scan_objects(data);
        if objects.is_empty() {
            return Err(InspectError::NoObjects);
        }
        debug!(count = objects.len(), "scanned indirect objects");

        let mut doc = Document {
            path: path.to_path_buf(),
            objects,
            pages: Vec::new(),
            media_boxes: Vec::new(),
        };

        let catalog = doc.find_catalog(data)?;
        let pages_ref = catalog
            .get("Pages")
            .ok_or(InspectError::BadPageTree)?
            .clone();
        let mut visited = std::collections::HashSet::new();
        doc.collect_pages(&pages_ref, None, &mut visited, 0)?;
        if doc.pages.is_empty() {
            return Err(InspectError::BadPageTree);
        }
        Ok(doc)
    }

    /// Number of pages in document order.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Measure every page: declared dimensions plus text bounding boxes.
    ///
    /// More than one page is a soft anomaly during fitting (an oversized
    /// trial may legitimately overflow), logged rather than failed.
    pub fn measure(&self) -> Result<Vec<PageGeometry>, LongPdfError> {
        if self.pages.len() > 1 {
            warn!(
                pages = self.pages.len(),
                path = %self.path.display(),
                "more than one page found during measurement"
            );
        }
        let mut samples = Vec::with_capacity(self.pages.len());
        for (index, page) in self.pages.iter().enumerate() {
            let media_box = self.media_boxes[index];
            let content = self
                .page_content(page)
                .map_err(|e| self.malformed(e))?;
            let text_blocks =
                content::text_bounding_boxes(&content).map_err(|e| self.malformed(e))?;
            samples.push(PageGeometry {
                index,
                width_pts: (media_box[2] - media_box[0]).abs(),
                height_pts: (media_box[3] - media_box[1]).abs(),
                text_blocks,
            });
        }
        Ok(samples)
    }

    fn malformed(&self, e: InspectError) -> LongPdfError {
        LongPdfError::MalformedPdf {
            path: self.path.clone(),
            detail: e.to_string(),
        }
    }

    /// Follow indirect references until a direct object is reached.
    fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        static NULL: Object = Object::Null;
        let mut current = obj;
        for _ in 0..32 {
            match current {
                Object::Ref(ObjRef { num, .. }) => match self.objects.get(num) {
                    Some(next) => current = next,
                    None => return &NULL,
                },
                other => return other,
            }
        }
        &NULL
    }

    /// The document catalog: via the last trailer's `/Root`, or by
    /// scanning for a `/Type /Catalog` object when no classic trailer
    /// parses (cross-reference-stream files).
    fn find_catalog(&self, data: &[u8]) -> Result<HashMap<String, Object>, InspectError> {
        for trailer_pos in find_all(data, b"trailer").into_iter().rev() {
            let Ok(mut parser) = Parser::new(data, trailer_pos + b"trailer".len()) else {
                continue;
            };
            let Ok(Some(obj)) = parser.next_object() else {
                continue;
            };
            if let Some(dict) = obj.as_dict() {
                if let Some(root) = dict.get("Root") {
                    if let Some(catalog) = self.resolve(root).as_dict() {
                        return Ok(catalog.clone());
                    }
                }
            }
        }
        self.objects
            .values()
            .find_map(|obj| {
                let dict = obj.as_dict()?;
                (dict.get("Type").and_then(Object::as_name) == Some("Catalog"))
                    .then(|| dict.clone())
            })
            .ok_or(InspectError::NoCatalog)
    }

    /// Depth-first page-tree walk collecting leaf `/Page` dictionaries in
    /// order, carrying the inheritable `MediaBox` down from `/Pages`
    /// nodes.
    fn collect_pages(
        &mut self,
        node: &Object,
        inherited_media_box: Option<[f64; 4]>,
        visited: &mut std::collections::HashSet<u32>,
        depth: usize,
    ) -> Result<(), InspectError> {
        if depth > 64 {
            return Err(InspectError::BadPageTree);
        }
        if let Some(r) = node.as_ref() {
            if !visited.insert(r.num) {
                return Err(InspectError::BadPageTree);
            }
        }
        let dict = match self.resolve(node).as_dict() {
            Some(d) => d.clone(),
            None => return Err(InspectError::BadPageTree),
        };

        let media_box = dict
            .get("MediaBox")
            .map(|b| self.resolve(b))
            .and_then(rectangle)
            .or(inherited_media_box);

        match dict.get("Type").and_then(Object::as_name) {
            Some("Pages") => {
                let kids = dict
                    .get("Kids")
                    .map(|k| self.resolve(k))
                    .and_then(Object::as_array)
                    .ok_or(InspectError::BadPageTree)?
                    .to_vec();
                for kid in &kids {
                    self.collect_pages(kid, media_box, visited, depth + 1)?;
                }
            }
            _ => {
                // Treat any non-/Pages node as a leaf page; some writers
                // omit /Type on page objects.
                let media_box =
                    media_box.ok_or(InspectError::NoMediaBox(self.pages.len()))?;
                self.pages.push(dict);
                self.media_boxes.push(media_box);
            }
        }
        Ok(())
    }

    /// Concatenated, decoded content-stream bytes of one page.
    fn page_content(&self, page: &HashMap<String, Object>) -> Result<Vec<u8>, InspectError> {
        let Some(contents) = page.get("Contents") else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        match self.resolve(contents) {
            Object::Array(items) => {
                for item in items.clone() {
                    out.extend_from_slice(&self.stream_data(&item)?);
                    out.push(b'\n');
                }
            }
            direct => {
                let direct = direct.clone();
                out.extend_from_slice(&self.stream_data(&direct)?);
            }
        }
        Ok(out)
    }

    fn stream_data(&self, obj: &Object) -> Result<Vec<u8>, InspectError> {
        match self.resolve(obj) {
            Object::Stream { dict, data } => decode_stream(dict, data),
            _ => Err(InspectError::Syntax("content is not a stream".into())),
        }
    }
}

/// Brute-scan for `N G obj` markers and parse each body. Later offsets
/// supersede earlier ones, matching incremental-update semantics. Matches
/// that fail to parse (e.g. the pattern occurring inside stream data) are
/// skipped.
fn scan_objects(data: &[u8]) -> HashMap<u32, Object> {
    let mut objects = HashMap::new();
    for captures in RE_INDIRECT_OBJ.captures_iter(data) {
        let full = captures.get(0).unwrap();
        let Some(num) = std::str::from_utf8(&captures[1])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        else {
            continue;
        };
        let Ok(mut parser) = Parser::new(data, full.end()) else {
            continue;
        };
        match parser.next_object() {
            Ok(Some(obj)) => {
                objects.insert(num, obj);
            }
            _ => continue,
        }
    }
    objects
}

fn find_all(data: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut from = 0;
    while from + needle.len() <= data.len() {
        match data[from..]
            .windows(needle.len())
            .position(|w| w == needle)
        {
            Some(at) => {
                positions.push(from + at);
                from += at + 1;
            }
            None => break,
        }
    }
    positions
}

fn rectangle(obj: &Object) -> Option<[f64; 4]> {
    let items = obj.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        *slot = item.as_number()?;
    }
    Some(rect)
}

/// Decode a stream body according to its `/Filter`: raw or `FlateDecode`.
fn decode_stream(
    dict: &HashMap<String, Object>,
    data: &[u8],
) -> Result<Vec<u8>, InspectError> {
    let filters: Vec<String> = match dict.get("Filter") {
        None => Vec::new(),
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().map(str::to_string))
            .collect(),
        Some(_) => return Err(InspectError::Syntax("bad /Filter".into())),
    };

    let mut bytes = data.to_vec();
    for filter in filters {
        match filter.as_str() {
            "FlateDecode" => {
                let mut out = Vec::new();
                ZlibDecoder::new(bytes.as_slice())
                    .read_to_end(&mut out)
                    .map_err(|e| InspectError::Decode(e.to_string()))?;
                bytes = out;
            }
            other => return Err(InspectError::UnsupportedFilter(other.to_string())),
        }
    }
    Ok(bytes)
}
