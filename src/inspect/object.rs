//! PDF object lexer and parser.
//!
//! Tokenises and parses the subset of PDF syntax the layout inspector
//! needs: numbers, strings, names, arrays, dictionaries, streams and
//! indirect references. The parser keeps a 2-token lookahead so it can
//! recognise the `N G R` reference pattern and the `<< … >> stream`
//! transition without backtracking.

use super::InspectError;
use std::collections::HashMap;

/// A parsed PDF object.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Object {
    Null,
    Boolean(bool),
    Number(f64),
    /// Literal string `(…)` with escapes resolved.
    String(Vec<u8>),
    /// Hex string `<…>` with nibbles decoded.
    HexString(Vec<u8>),
    /// Name `/…` with `#xx` escapes resolved.
    Name(String),
    Array(Vec<Object>),
    Dictionary(HashMap<String, Object>),
    Stream {
        dict: HashMap<String, Object>,
        data: Vec<u8>,
    },
    /// Indirect reference `N G R`.
    Ref(ObjRef),
    /// Bare keyword; in content streams these are the operators.
    Operator(String),
}

/// Indirect object reference (`5 0 R`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObjRef {
    pub num: u32,
    pub gen: u16,
}

impl Object {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<String, Object>> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Option<ObjRef> {
        match self {
            Object::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_string_bytes(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) | Object::HexString(s) => Some(s),
            _ => None,
        }
    }
}

// ── Lexer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    String(Vec<u8>),
    HexString(Vec<u8>),
    Name(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Command(String),
    Eof,
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Byte-slice tokenizer positioned anywhere inside a PDF file or content
/// stream.
pub(crate) struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(b) = self.bump() {
                    if b == b'\n' || b == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Lex the next token.
    pub fn next_token(&mut self) -> Result<Token, InspectError> {
        self.skip_whitespace_and_comments();
        let Some(b) = self.peek() else {
            return Ok(Token::Eof);
        };
        match b {
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.lex_number(),
            b'(' => self.lex_literal_string(),
            b'<' => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.pos += 2;
                    Ok(Token::DictStart)
                } else {
                    self.lex_hex_string()
                }
            }
            b'>' => {
                if self.data.get(self.pos + 1) == Some(&b'>') {
                    self.pos += 2;
                    Ok(Token::DictEnd)
                } else {
                    Err(InspectError::Syntax("stray '>'".into()))
                }
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::ArrayEnd)
            }
            b'/' => self.lex_name(),
            b'{' | b'}' => {
                // PostScript-calculator braces; skip as one-byte commands.
                self.pos += 1;
                Ok(Token::Command((b as char).to_string()))
            }
            _ => self.lex_command(),
        }
    }

    fn lex_number(&mut self) -> Result<Token, InspectError> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9') | Some(b'.')) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| InspectError::Syntax("non-ASCII number".into()))?;
        let value: f64 = if text == "." || text == "-" || text == "+" {
            0.0
        } else {
            text.parse()
                .map_err(|_| InspectError::Syntax(format!("bad number '{text}'")))?
        };
        Ok(Token::Number(value))
    }

    fn lex_literal_string(&mut self) -> Result<Token, InspectError> {
        self.pos += 1; // consume '('
        let mut out = Vec::new();
        let mut depth = 1usize;
        loop {
            let b = self.bump().ok_or(InspectError::UnexpectedEof)?;
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\\' => {
                    let e = self.bump().ok_or(InspectError::UnexpectedEof)?;
                    match e {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'(' | b')' | b'\\' => out.push(e),
                        b'\r' => {
                            // line continuation; swallow an optional LF
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = (e - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u32;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xff) as u8);
                        }
                        other => out.push(other),
                    }
                }
                _ => out.push(b),
            }
        }
        Ok(Token::String(out))
    }

    fn lex_hex_string(&mut self) -> Result<Token, InspectError> {
        self.pos += 1; // consume '<'
        let mut nibbles = Vec::new();
        loop {
            let b = self.bump().ok_or(InspectError::UnexpectedEof)?;
            match b {
                b'>' => break,
                b'0'..=b'9' => nibbles.push(b - b'0'),
                b'a'..=b'f' => nibbles.push(b - b'a' + 10),
                b'A'..=b'F' => nibbles.push(b - b'A' + 10),
                _ if is_whitespace(b) => {}
                _ => return Err(InspectError::Syntax("bad hex string byte".into())),
            }
        }
        if nibbles.len() % 2 == 1 {
            nibbles.push(0); // odd count: final digit padded with 0
        }
        let bytes = nibbles
            .chunks_exact(2)
            .map(|pair| (pair[0] << 4) | pair[1])
            .collect();
        Ok(Token::HexString(bytes))
    }

    fn lex_name(&mut self) -> Result<Token, InspectError> {
        self.pos += 1; // consume '/'
        let mut out = String::new();
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                let hi = self.bump().ok_or(InspectError::UnexpectedEof)?;
                let lo = self.bump().ok_or(InspectError::UnexpectedEof)?;
                let decode = |c: u8| -> Result<u8, InspectError> {
                    match c {
                        b'0'..=b'9' => Ok(c - b'0'),
                        b'a'..=b'f' => Ok(c - b'a' + 10),
                        b'A'..=b'F' => Ok(c - b'A' + 10),
                        _ => Err(InspectError::Syntax("bad name escape".into())),
                    }
                };
                out.push(((decode(hi)? << 4) | decode(lo)?) as char);
            } else {
                out.push(b as char);
            }
        }
        Ok(Token::Name(out))
    }

    fn lex_command(&mut self) -> Result<Token, InspectError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            // A byte that is neither whitespace, delimiter, nor regular:
            // consume it so the lexer always makes progress.
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.data[start..self.pos]).into_owned();
        Ok(Token::Command(text))
    }

    // ── Raw access used by stream parsing ────────────────────────────────

    /// Skip the single end-of-line sequence that follows the `stream`
    /// keyword.
    fn skip_stream_eol(&mut self) {
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], InspectError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or(InspectError::UnexpectedEof)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Scan forward for a marker, returning the bytes before it and
    /// positioning the lexer after it.
    fn take_until_marker(&mut self, marker: &[u8]) -> Result<&'a [u8], InspectError> {
        let haystack = &self.data[self.pos..];
        let at = haystack
            .windows(marker.len())
            .position(|w| w == marker)
            .ok_or(InspectError::UnexpectedEof)?;
        let slice = &haystack[..at];
        self.pos += at + marker.len();
        Ok(slice)
    }
}

// ── Parser ───────────────────────────────────────────────────────────────

/// Object parser with a 2-token lookahead over a [`Lexer`].
///
/// The lookahead is what lets `N G R` collapse into a [`Object::Ref`] and a
/// dictionary's trailing `stream` keyword divert into raw-byte stream
/// reading before the lexer has a chance to tokenise binary data.
pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    buf1: Option<Token>,
    buf2: Option<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Result<Self, InspectError> {
        let mut lexer = Lexer::new(data, pos);
        let buf1 = Some(lexer.next_token()?);
        let buf2 = Some(lexer.next_token()?);
        Ok(Self { lexer, buf1, buf2 })
    }

    fn shift(&mut self) -> Result<(), InspectError> {
        self.buf1 = self.buf2.take();
        self.buf2 = Some(self.lexer.next_token()?);
        Ok(())
    }

    /// Parse the next object, or `None` at end of input.
    pub fn next_object(&mut self) -> Result<Option<Object>, InspectError> {
        let token = self
            .buf1
            .take()
            .ok_or_else(|| InspectError::Syntax("parser buffer empty".into()))?;
        if token == Token::Eof {
            self.buf1 = Some(Token::Eof);
            return Ok(None);
        }
        self.shift()?;

        let obj = match token {
            Token::ArrayStart => self.parse_array()?,
            Token::DictStart => self.parse_dictionary()?,
            Token::ArrayEnd => return Err(InspectError::Syntax("unexpected ']'".into())),
            Token::DictEnd => return Err(InspectError::Syntax("unexpected '>>'".into())),
            Token::Number(n) => {
                // `N G R` → indirect reference
                if let (Some(Token::Number(gen)), Some(Token::Command(cmd))) =
                    (&self.buf1, &self.buf2)
                {
                    if cmd == "R" && n >= 0.0 && *gen >= 0.0 {
                        let reference = ObjRef {
                            num: n as u32,
                            gen: *gen as u16,
                        };
                        self.shift()?;
                        self.shift()?;
                        return Ok(Some(Object::Ref(reference)));
                    }
                }
                Object::Number(n)
            }
            Token::String(s) => Object::String(s),
            Token::HexString(s) => Object::HexString(s),
            Token::Name(n) => Object::Name(n),
            Token::Command(c) => match c.as_str() {
                "true" => Object::Boolean(true),
                "false" => Object::Boolean(false),
                "null" => Object::Null,
                _ => Object::Operator(c),
            },
            Token::Eof => unreachable!("handled above"),
        };
        Ok(Some(obj))
    }

    fn parse_array(&mut self) -> Result<Object, InspectError> {
        let mut items = Vec::new();
        loop {
            match &self.buf1 {
                Some(Token::ArrayEnd) => {
                    self.shift()?;
                    break;
                }
                Some(Token::Eof) | None => {
                    return Err(InspectError::Syntax("unterminated array".into()))
                }
                _ => {
                    let obj = self
                        .next_object()?
                        .ok_or_else(|| InspectError::Syntax("unterminated array".into()))?;
                    items.push(obj);
                }
            }
        }
        Ok(Object::Array(items))
    }

    fn parse_dictionary(&mut self) -> Result<Object, InspectError> {
        let mut dict = HashMap::new();
        loop {
            match &self.buf1 {
                Some(Token::DictEnd) => break,
                Some(Token::Eof) | None => {
                    return Err(InspectError::Syntax("unterminated dictionary".into()))
                }
                Some(Token::Name(_)) => {
                    let Some(Token::Name(key)) = self.buf1.take() else {
                        unreachable!()
                    };
                    self.shift()?;
                    if matches!(self.buf1, Some(Token::DictEnd)) {
                        dict.insert(key, Object::Null);
                        break;
                    }
                    let value = self
                        .next_object()?
                        .ok_or_else(|| InspectError::Syntax("unterminated dictionary".into()))?;
                    dict.insert(key, value);
                }
                Some(other) => {
                    return Err(InspectError::Syntax(format!(
                        "dictionary key is not a name: {other:?}"
                    )))
                }
            }
        }

        // Dictionary followed by `stream`? At this point buf1 = '>>' and
        // buf2 is the token lexed right after it. Shifting further would
        // feed binary stream data into the lexer, so divert to raw reads.
        if matches!(&self.buf2, Some(Token::Command(cmd)) if cmd == "stream") {
            self.buf1 = None;
            self.buf2 = None;
            return self.parse_stream(dict);
        }

        self.shift()?; // consume '>>'
        Ok(Object::Dictionary(dict))
    }

    fn parse_stream(
        &mut self,
        dict: HashMap<String, Object>,
    ) -> Result<Object, InspectError> {
        // The lexer sits right after the `stream` keyword.
        self.lexer.skip_stream_eol();
        let start = self.lexer.position();

        let declared_len = dict.get("Length").and_then(Object::as_number);
        let data: Vec<u8> = match declared_len {
            Some(len) if len >= 0.0 => match self.lexer.take_bytes(len as usize) {
                Ok(bytes) => {
                    // Trust /Length only if `endstream` actually follows.
                    let mut probe = Lexer::new(self.lexer.data, self.lexer.position());
                    probe.skip_whitespace_and_comments();
                    if self.lexer.data[probe.position()..].starts_with(b"endstream") {
                        let bytes = bytes.to_vec();
                        self.lexer.pos = probe.position() + b"endstream".len();
                        bytes
                    } else {
                        self.lexer.pos = start;
                        trim_stream_tail(self.lexer.take_until_marker(b"endstream")?)
                    }
                }
                Err(_) => {
                    self.lexer.pos = start;
                    trim_stream_tail(self.lexer.take_until_marker(b"endstream")?)
                }
            },
            _ => trim_stream_tail(self.lexer.take_until_marker(b"endstream")?),
        };

        // Refill the lookahead now that the raw section is behind us.
        self.buf1 = Some(self.lexer.next_token()?);
        self.buf2 = Some(self.lexer.next_token()?);

        Ok(Object::Stream { dict, data })
    }
}

/// Drop the end-of-line bytes a writer places between stream data and the
/// `endstream` keyword.
fn trim_stream_tail(data: &[u8]) -> Vec<u8> {
    let mut end = data.len();
    while end > 0 && matches!(data[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    data[..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &str) -> Object {
        Parser::new(input.as_bytes(), 0)
            .unwrap()
            .next_object()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn parses_scalars() {
        assert_eq!(parse_one("42"), Object::Number(42.0));
        assert_eq!(parse_one("-3.5"), Object::Number(-3.5));
        assert_eq!(parse_one("true"), Object::Boolean(true));
        assert_eq!(parse_one("null"), Object::Null);
        assert_eq!(parse_one("/Type"), Object::Name("Type".into()));
        assert_eq!(parse_one("(hello)"), Object::String(b"hello".to_vec()));
        assert_eq!(parse_one("<48656c6C6f>"), Object::HexString(b"Hello".to_vec()));
    }

    #[test]
    fn parses_string_escapes() {
        assert_eq!(
            parse_one(r"(a\(b\)c\\d\n)"),
            Object::String(b"a(b)c\\d\n".to_vec())
        );
        assert_eq!(parse_one(r"(\101\102)"), Object::String(b"AB".to_vec()));
        assert_eq!(parse_one("(nested (parens) ok)"), {
            Object::String(b"nested (parens) ok".to_vec())
        });
    }

    #[test]
    fn parses_name_escapes() {
        assert_eq!(parse_one("/A#20B"), Object::Name("A B".into()));
    }

    #[test]
    fn parses_arrays_and_dicts() {
        assert_eq!(
            parse_one("[1 /N (s)]"),
            Object::Array(vec![
                Object::Number(1.0),
                Object::Name("N".into()),
                Object::String(b"s".to_vec()),
            ])
        );
        let obj = parse_one("<< /Type /Page /MediaBox [0 0 595 842] >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type").unwrap().as_name(), Some("Page"));
        assert_eq!(dict.get("MediaBox").unwrap().as_array().unwrap().len(), 4);
    }

    #[test]
    fn parses_indirect_reference() {
        assert_eq!(
            parse_one("5 0 R"),
            Object::Ref(ObjRef { num: 5, gen: 0 })
        );
        let obj = parse_one("<< /Parent 2 0 R >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(
            dict.get("Parent").unwrap().as_ref(),
            Some(ObjRef { num: 2, gen: 0 })
        );
    }

    #[test]
    fn parses_stream_with_length() {
        let input = b"<< /Length 5 >>\nstream\nBT ET\nendstream\n42";
        let mut parser = Parser::new(input, 0).unwrap();
        let obj = parser.next_object().unwrap().unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(data, b"BT ET"),
            other => panic!("expected stream, got {other:?}"),
        }
        // Parsing continues cleanly after the raw section.
        assert_eq!(parser.next_object().unwrap(), Some(Object::Number(42.0)));
    }

    #[test]
    fn parses_stream_with_wrong_length_by_scanning() {
        let input = b"<< /Length 999 >>\nstream\nBT ET\nendstream";
        let mut parser = Parser::new(input, 0).unwrap();
        let obj = parser.next_object().unwrap().unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(data, b"BT ET"),
            other => panic!("expected stream, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_structures_error() {
        assert!(Parser::new(b"[1 2", 0).unwrap().next_object().is_err());
        assert!(Parser::new(b"<< /K 1", 0).unwrap().next_object().is_err());
    }

    #[test]
    fn content_stream_operators_come_out_as_operators() {
        let mut parser = Parser::new(b"BT 10 20 Td (x) Tj ET", 0).unwrap();
        let mut ops = Vec::new();
        while let Some(obj) = parser.next_object().unwrap() {
            if let Object::Operator(op) = obj {
                ops.push(op);
            }
        }
        assert_eq!(ops, vec!["BT", "Td", "Tj", "ET"]);
    }
}
