//! Readers for the datamine asset tree: `.blk` text and `.blkx` JSON.
//!
//! Both syntaxes land in the same [`BlkValue`] tree. Blocks keep source order
//! and repeated keys, since the game encodes lists (e.g. `Weapon`) as repeated
//! entries.

mod blk_value;

pub use blk_value::{parse_locale_number, BlkValue};

use crate::config::MAX_SOURCE_FILE_BYTES;
use crate::error::Error;
use std::path::Path;
use std::str::FromStr;

/// Parse already-read file contents. `.blkx` and `.json` are JSON, anything
/// else is blk text.
pub fn parse_source(path: &Path, bytes: &[u8]) -> Result<BlkValue, Error> {
    let wrap = |source| Error::Parse {
        file: path.to_path_buf(),
        source,
    };
    if bytes.len() > MAX_SOURCE_FILE_BYTES {
        return Err(wrap(ParseError::InputTooLarge));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| wrap(ParseError::Syntax(format!("invalid UTF-8: {}", e))))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "blkx" | "json" => parse_blkx(text),
        _ => parse_blk_text(text),
    }
    .map_err(wrap)
}

/// Parse the JSON form produced by datamine unpackers.
pub fn parse_blkx(content: &str) -> Result<BlkValue, ParseError> {
    if content.len() > MAX_SOURCE_FILE_BYTES {
        return Err(ParseError::InputTooLarge);
    }
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    serde_json::from_str(content).map_err(|e| ParseError::Syntax(e.to_string()))
}

/// Parse blk text: `name:type=value` fields and `name{ ... }` blocks.
pub fn parse_blk_text(content: &str) -> Result<BlkValue, ParseError> {
    if content.len() > MAX_SOURCE_FILE_BYTES {
        return Err(ParseError::InputTooLarge);
    }
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut p = Parser::new(content);
    let entries = p.parse_entries(false)?;
    Ok(BlkValue::Block(entries))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedEof,
    UnexpectedChar(char),
    InvalidNumber { at: usize },
    UnclosedString,
    InputTooLarge,
    NestedTooDeep,
    InvalidEscape,
    UnknownType(String),
    InvalidBool(String),
    Syntax(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnexpectedEof => write!(f, "unexpected end of input"),
            ParseError::UnexpectedChar(c) => write!(f, "unexpected character: {:?}", c),
            ParseError::InvalidNumber { at } => write!(f, "invalid number at byte {}", at),
            ParseError::UnclosedString => write!(f, "unclosed string"),
            ParseError::InputTooLarge => write!(f, "input exceeds maximum size"),
            ParseError::NestedTooDeep => write!(f, "nesting too deep"),
            ParseError::InvalidEscape => write!(f, "invalid escape in string"),
            ParseError::UnknownType(t) => write!(f, "unknown field type tag: {}", t),
            ParseError::InvalidBool(s) => write!(f, "invalid boolean: {}", s),
            ParseError::Syntax(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

const MAX_DEPTH: u32 = 128;

struct Parser<'a> {
    s: &'a str,
    pos: usize,
    depth: u32,
}

impl<'a> Parser<'a> {
    fn new(s: &'a str) -> Self {
        Parser {
            s,
            pos: 0,
            depth: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            if rest.len() != trimmed.len() {
                self.pos += rest.len() - trimmed.len();
                continue;
            }
            if rest.starts_with("/*") {
                match rest.find("*/") {
                    Some(end) => self.pos += end + 2,
                    None => self.pos = self.s.len(),
                }
                continue;
            }
            if rest.starts_with("//") {
                match rest.find('\n') {
                    Some(nl) => self.pos += nl + 1,
                    None => self.pos = self.s.len(),
                }
                continue;
            }
            break;
        }
    }

    /// Entries until `}` (nested) or end of input (root).
    fn parse_entries(&mut self, nested: bool) -> Result<Vec<(String, BlkValue)>, ParseError> {
        if nested {
            if self.depth >= MAX_DEPTH {
                return Err(ParseError::NestedTooDeep);
            }
            self.depth += 1;
        }
        let mut entries = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let Some(c) = self.peek() else {
                if nested {
                    return Err(ParseError::UnexpectedEof);
                }
                break;
            };
            if c == '}' {
                if !nested {
                    return Err(ParseError::UnexpectedChar(c));
                }
                self.pos += 1;
                break;
            }
            if c == ';' {
                self.pos += 1;
                continue;
            }
            let name = self.parse_name()?;
            self.skip_whitespace_and_comments();
            match self.peek() {
                Some('{') => {
                    self.pos += 1;
                    let inner = self.parse_entries(true)?;
                    entries.push((name, BlkValue::Block(inner)));
                }
                Some(':') => {
                    self.pos += 1;
                    let tag = self.parse_word();
                    self.skip_whitespace_and_comments();
                    if self.peek() != Some('=') {
                        return Err(self.unexpected());
                    }
                    self.pos += 1;
                    self.skip_whitespace_and_comments();
                    let value = self.parse_typed_value(&tag)?;
                    entries.push((name, value));
                }
                Some(c) => return Err(ParseError::UnexpectedChar(c)),
                None => return Err(ParseError::UnexpectedEof),
            }
        }
        if nested {
            self.depth -= 1;
        }
        Ok(entries)
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Some(c) => ParseError::UnexpectedChar(c),
            None => ParseError::UnexpectedEof,
        }
    }

    fn parse_name(&mut self) -> Result<String, ParseError> {
        if matches!(self.peek(), Some('"') | Some('\'')) {
            return self.parse_string();
        }
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.unexpected());
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    fn parse_word(&mut self) -> String {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphanumeric())
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += len;
        rest[..len].to_string()
    }

    fn parse_typed_value(&mut self, tag: &str) -> Result<BlkValue, ParseError> {
        match tag {
            "t" => self.parse_string().map(BlkValue::Str),
            "r" | "i" | "i64" | "u" => self.parse_number().map(BlkValue::Number),
            "b" => {
                let word = self.parse_word();
                match word.as_str() {
                    "yes" | "true" | "on" => Ok(BlkValue::Bool(true)),
                    "no" | "false" | "off" => Ok(BlkValue::Bool(false)),
                    _ => Err(ParseError::InvalidBool(word)),
                }
            }
            "p2" | "p3" | "p4" | "ip2" | "ip3" | "ip4" | "c" => self.parse_tuple(),
            "m" => self.parse_matrix(),
            other => Err(ParseError::UnknownType(other.to_string())),
        }
    }

    /// Comma-separated numbers on one field: `p2=1.0, 2.0`.
    fn parse_tuple(&mut self) -> Result<BlkValue, ParseError> {
        let mut items = vec![BlkValue::Number(self.parse_number()?)];
        loop {
            let save = self.pos;
            self.skip_whitespace_and_comments();
            if self.peek() == Some(',') {
                self.pos += 1;
                self.skip_whitespace_and_comments();
                items.push(BlkValue::Number(self.parse_number()?));
            } else {
                self.pos = save;
                break;
            }
        }
        Ok(BlkValue::Array(items))
    }

    /// `[[1, 0, 0] [0, 1, 0]]`
    fn parse_matrix(&mut self) -> Result<BlkValue, ParseError> {
        if self.peek() != Some('[') {
            return Err(self.unexpected());
        }
        self.pos += 1;
        let mut rows = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                Some('[') => {
                    self.pos += 1;
                    let mut row = Vec::new();
                    loop {
                        self.skip_whitespace_and_comments();
                        match self.peek() {
                            Some(']') => {
                                self.pos += 1;
                                break;
                            }
                            Some(',') => self.pos += 1,
                            Some(_) => row.push(BlkValue::Number(self.parse_number()?)),
                            None => return Err(ParseError::UnexpectedEof),
                        }
                    }
                    rows.push(BlkValue::Array(row));
                }
                _ => return Err(self.unexpected()),
            }
        }
        Ok(BlkValue::Array(rows))
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.unexpected()),
        };
        self.pos += 1;
        let mut s = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::UnclosedString);
            };
            if c == quote {
                self.pos += 1;
                break;
            }
            if c == '\\' {
                self.pos += 1;
                let rest = self.rest();
                if rest.is_empty() {
                    return Err(ParseError::InvalidEscape);
                }
                let (esc, len) = parse_escape(rest)?;
                s.push(esc);
                self.pos += len;
                continue;
            }
            s.push(c);
            self.pos += c.len_utf8();
        }
        Ok(s)
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        let rest = self.rest();
        let mut end = 0usize;
        for (i, c) in rest.char_indices() {
            let sign_ok = (c == '-' || c == '+')
                && (i == 0 || matches!(rest[..i].chars().last(), Some('e') | Some('E')));
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || sign_ok {
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        if end == 0 {
            return Err(ParseError::InvalidNumber { at: start });
        }
        let n = f64::from_str(&rest[..end]).map_err(|_| ParseError::InvalidNumber { at: start })?;
        self.pos += end;
        Ok(n)
    }
}

fn parse_escape(rest: &str) -> Result<(char, usize), ParseError> {
    let c = rest.chars().next().ok_or(ParseError::InvalidEscape)?;
    match c {
        'n' => Ok(('\n', 1)),
        'r' => Ok(('\r', 1)),
        't' => Ok(('\t', 1)),
        '\\' => Ok(('\\', 1)),
        '"' => Ok(('"', 1)),
        '\'' => Ok(('\'', 1)),
        _ => Err(ParseError::InvalidEscape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_text() {
        let v = parse_blk_text("").unwrap();
        assert!(v.entries().is_empty());
    }

    #[test]
    fn parse_typed_fields() {
        let v = parse_blk_text(
            r#"
            model:t="t_34_1940"
            speed:r=662.0
            count:i=-3
            dummy:b=no
            pos:p3=1.5, -2, 3e2
            "#,
        )
        .unwrap();
        assert_eq!(v.get_str("model"), Some("t_34_1940"));
        assert_eq!(v.get_f64("speed"), Some(662.0));
        assert_eq!(v.get_f64("count"), Some(-3.0));
        assert_eq!(v.get_bool("dummy"), Some(false));
        let pos = v.get("pos").and_then(BlkValue::as_array).unwrap();
        assert_eq!(pos.len(), 3);
        assert_eq!(pos[2].as_f64(), Some(300.0));
    }

    #[test]
    fn parse_nested_blocks_keep_repeats() {
        let v = parse_blk_text(
            r#"
            commonWeapons{
              Weapon{ trigger:t="gunner0"; blk:t="a.blk" }
              // coaxial
              Weapon{ trigger:t="gunner1"; blk:t="b.blk" }
            }
            "#,
        )
        .unwrap();
        let weapons = v.lookup("commonWeapons").unwrap().list("Weapon");
        assert_eq!(weapons.len(), 2);
        assert_eq!(weapons[1].get_str("blk"), Some("b.blk"));
    }

    #[test]
    fn parse_matrix_field() {
        let v = parse_blk_text("tm:m=[[1, 0, 0] [0, 1, 0]]").unwrap();
        let rows = v.get("tm").and_then(BlkValue::as_array).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn unclosed_block_fails() {
        assert_eq!(
            parse_blk_text("cockpit{ zoomInFov:r=10"),
            Err(ParseError::UnexpectedEof)
        );
    }

    #[test]
    fn unknown_type_tag_fails() {
        assert!(matches!(
            parse_blk_text("x:zz=1"),
            Err(ParseError::UnknownType(t)) if t == "zz"
        ));
    }

    #[test]
    fn unclosed_string_fails() {
        assert_eq!(
            parse_blk_text(r#"name:t="open"#),
            Err(ParseError::UnclosedString)
        );
    }

    #[test]
    fn blkx_keeps_duplicate_keys_in_order() {
        let v = parse_blkx(r#"{"b": 1, "a": {"x": "1,5"}, "b": 2}"#).unwrap();
        let keys: Vec<&str> = v.entries().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "b"]);
        assert_eq!(v.list("b").len(), 2);
        assert_eq!(v.get_f64("a.x"), Some(1.5));
    }

    #[test]
    fn blkx_syntax_error() {
        assert!(matches!(parse_blkx("{\"a\": }"), Err(ParseError::Syntax(_))));
    }

    #[test]
    fn parse_source_reports_file() {
        let err = parse_source(Path::new("tank.blkx"), b"{").unwrap_err();
        match err {
            Error::Parse { file, .. } => assert_eq!(file, Path::new("tank.blkx")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
