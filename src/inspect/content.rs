//! Content-stream walk: bounding boxes of text objects.
//!
//! Replays the text-positioning state machine (`Tm`/`Td`/`TD`/`TL`/`T*`)
//! across a page's content stream and records one bounding box per
//! `BT … ET` text object. Glyph metrics are approximated; an exact
//! advance width is not needed to find the lowest baseline on the page,
//! which is the only measurement the fitting loop consumes.

use super::object::{Object, Parser};
use super::InspectError;

/// Axis-aligned bounding box in PDF user-space points, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    fn extend(&mut self, other: BBox) {
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
    }
}

/// Average glyph advance as a fraction of the font size. Good enough for
/// a horizontal extent estimate; vertical positions are exact.
const APPROX_ADVANCE: f64 = 0.5;

/// Text matrix as the 6-tuple `[a b c d e f]`.
type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m × n` in PDF row-vector convention.
fn multiply(m: Matrix, n: Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translation(tx: f64, ty: f64) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

struct TextWalk {
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f64,
    font_size: f64,
    in_text: bool,
    current: Option<BBox>,
    blocks: Vec<BBox>,
}

impl TextWalk {
    fn new() -> Self {
        Self {
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            leading: 0.0,
            font_size: 0.0,
            in_text: false,
            current: None,
            blocks: Vec::new(),
        }
    }

    fn begin_text(&mut self) {
        self.in_text = true;
        self.text_matrix = IDENTITY;
        self.line_matrix = IDENTITY;
        self.current = None;
    }

    fn end_text(&mut self) {
        self.in_text = false;
        if let Some(bbox) = self.current.take() {
            self.blocks.push(bbox);
        }
    }

    fn move_text(&mut self, tx: f64, ty: f64) {
        self.line_matrix = multiply(translation(tx, ty), self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_text(0.0, -self.leading);
    }

    fn show(&mut self, glyph_count: usize) {
        if !self.in_text {
            return;
        }
        let m = self.text_matrix;
        let (x, y) = (m[4], m[5]);
        let h_scale = (m[0] * m[0] + m[2] * m[2]).sqrt();
        let v_scale = (m[1] * m[1] + m[3] * m[3]).sqrt();
        let height = self.font_size * v_scale;
        let width = self.font_size * APPROX_ADVANCE * glyph_count as f64 * h_scale;
        let line = BBox {
            x0: x,
            y0: y,
            x1: x + width,
            y1: y + height,
        };
        match &mut self.current {
            Some(bbox) => bbox.extend(line),
            none => *none = Some(line),
        }
    }
}

fn number(operands: &[Object], index: usize) -> f64 {
    operands.get(index).and_then(Object::as_number).unwrap_or(0.0)
}

/// Walk `content` and return one bounding box per `BT … ET` text object
/// that showed at least one glyph.
pub(crate) fn text_bounding_boxes(content: &[u8]) -> Result<Vec<BBox>, InspectError> {
    let mut parser = Parser::new(content, 0)?;
    let mut walk = TextWalk::new();
    let mut operands: Vec<Object> = Vec::new();

    while let Some(obj) = parser.next_object()? {
        let Object::Operator(op) = obj else {
            operands.push(obj);
            continue;
        };
        match op.as_str() {
            "BT" => walk.begin_text(),
            "ET" => walk.end_text(),
            "Tf" => walk.font_size = number(&operands, 1),
            "TL" => walk.leading = number(&operands, 0),
            "Td" => walk.move_text(number(&operands, 0), number(&operands, 1)),
            "TD" => {
                walk.leading = -number(&operands, 1);
                walk.move_text(number(&operands, 0), number(&operands, 1));
            }
            "Tm" => {
                let m = [
                    number(&operands, 0),
                    number(&operands, 1),
                    number(&operands, 2),
                    number(&operands, 3),
                    number(&operands, 4),
                    number(&operands, 5),
                ];
                walk.text_matrix = m;
                walk.line_matrix = m;
            }
            "T*" => walk.next_line(),
            "Tj" => {
                let count = operands
                    .last()
                    .and_then(Object::as_string_bytes)
                    .map_or(0, <[u8]>::len);
                walk.show(count);
            }
            "'" => {
                walk.next_line();
                let count = operands
                    .last()
                    .and_then(Object::as_string_bytes)
                    .map_or(0, <[u8]>::len);
                walk.show(count);
            }
            "\"" => {
                walk.next_line();
                let count = operands
                    .get(2)
                    .and_then(Object::as_string_bytes)
                    .map_or(0, <[u8]>::len);
                walk.show(count);
            }
            "TJ" => {
                let count: usize = operands
                    .last()
                    .and_then(Object::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Object::as_string_bytes)
                            .map(<[u8]>::len)
                            .sum()
                    })
                    .unwrap_or(0);
                walk.show(count);
            }
            // Every other operator (paths, colour, XObjects, …) only needs
            // its operands discarded.
            _ => {}
        }
        operands.clear();
    }

    if let Some(bbox) = walk.current.take() {
        // Tolerate a truncated stream missing its final ET.
        walk.blocks.push(bbox);
    }
    Ok(walk.blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_text_object_at_td_position() {
        let blocks =
            text_bounding_boxes(b"BT /F1 10 Tf 72 700 Td (Hello) Tj ET").unwrap();
        assert_eq!(blocks.len(), 1);
        let b = blocks[0];
        assert_eq!(b.x0, 72.0);
        assert_eq!(b.y0, 700.0);
        assert_eq!(b.y1, 710.0);
    }

    #[test]
    fn separate_bt_et_pairs_are_separate_blocks() {
        let content = b"BT /F1 10 Tf 72 700 Td (A) Tj ET\nBT /F1 10 Tf 72 500 Td (B) Tj ET";
        let blocks = text_bounding_boxes(content).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].y0, 700.0);
        assert_eq!(blocks[1].y0, 500.0);
    }

    #[test]
    fn multiple_lines_extend_one_block() {
        let content = b"BT /F1 12 Tf 14 TL 72 700 Td (first) Tj T* (second) Tj ET";
        let blocks = text_bounding_boxes(content).unwrap();
        assert_eq!(blocks.len(), 1);
        let b = blocks[0];
        assert_eq!(b.y0, 686.0, "T* drops by the leading");
        assert_eq!(b.y1, 712.0);
    }

    #[test]
    fn tm_sets_absolute_position() {
        let content = b"BT /F1 10 Tf 1 0 0 1 100 200 Tm (x) Tj ET";
        let blocks = text_bounding_boxes(content).unwrap();
        assert_eq!(blocks[0].x0, 100.0);
        assert_eq!(blocks[0].y0, 200.0);
    }

    #[test]
    fn tj_array_and_quote_operators_show_text() {
        let content = b"BT /F1 10 Tf 12 TL 72 700 Td [(a) -50 (b)] TJ ET\nBT /F1 10 Tf 12 TL 72 100 Td (p) Tj (q) ' ET";
        let blocks = text_bounding_boxes(content).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].y0, 88.0, "' moves to the next line first");
    }

    #[test]
    fn text_free_content_yields_no_blocks() {
        let blocks = text_bounding_boxes(b"1 0 0 1 0 0 cm 0 0 10 10 re f").unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn empty_text_object_yields_no_block() {
        let blocks = text_bounding_boxes(b"BT /F1 10 Tf 72 700 Td ET").unwrap();
        assert!(blocks.is_empty());
    }
}
