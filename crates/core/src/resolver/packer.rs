//! Dense-packed (`eval(function(p,a,c,k,e,d){…})`) script unpacking.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::script::{self, read_string_literal};
use super::{ResolveError, Stage};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

const MARKER: &str = "eval(function(p,a,c,k,e,";

/// Arguments of a packed wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed {
    pub payload: String,
    pub radix: u32,
    pub count: usize,
    pub symbols: Vec<String>,
}

fn packer_error(detail: impl Into<String>) -> ResolveError {
    ResolveError::new(Stage::Packer, detail)
}

/// Whether `source` contains a packed wrapper.
pub fn is_packed(source: &str) -> bool {
    source.replace(char::is_whitespace, "").contains(MARKER)
}

/// Encode token index `index` in base `radix`.
///
/// Digits below 36 use `[0-9a-z]`; higher digits map to `chr(d + 29)`.
pub fn encode_index(index: usize, radix: u32) -> String {
    let radix = radix.max(2) as usize;
    let digit = index % radix;
    let ch = if digit < 36 {
        char::from_digit(digit as u32, 36).unwrap_or('0')
    } else {
        char::from_u32(digit as u32 + 29).unwrap_or('?')
    };
    let mut out = if index < radix {
        String::new()
    } else {
        encode_index(index / radix, radix as u32)
    };
    out.push(ch);
    out
}

struct Cursor<'a> {
    chars: &'a [char],
    pos: usize,
}

impl Cursor<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ResolveError> {
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(packer_error(format!("expected '{}' at offset {}", c, self.pos)))
        }
    }

    fn string(&mut self) -> Result<String, ResolveError> {
        self.skip_ws();
        let (text, end) = read_string_literal(self.chars, self.pos)
            .ok_or_else(|| packer_error("malformed string argument"))?;
        self.pos = end;
        Ok(text)
    }

    fn integer(&mut self) -> Result<usize, ResolveError> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse()
            .map_err(|_| packer_error(format!("expected integer at offset {}", start)))
    }
}

/// Locate the wrapper and extract `(payload, radix, count, symbols)`.
pub fn extract(source: &str) -> Result<Packed, ResolveError> {
    let start = source
        .find(MARKER)
        .ok_or_else(|| packer_error("no packed wrapper"))?;
    let chars: Vec<char> = source[start..].chars().collect();

    // The argument list starts right after the function body: `}('`.
    let mut depth = 0usize;
    let mut body_end = None;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\'' | '"' => {
                if let Some((_, end)) = read_string_literal(&chars, i) {
                    i = end;
                    continue;
                }
            }
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    body_end = Some(i + 1);
                    break;
                }
            }
            _ => {}
        }
        i += 1;
    }
    let body_end = body_end.ok_or_else(|| packer_error("unterminated packer function"))?;

    let mut cursor = Cursor {
        chars: &chars,
        pos: body_end,
    };
    cursor.expect('(')?;
    let payload = cursor.string()?;
    cursor.expect(',')?;
    let radix = cursor.integer()?;
    cursor.expect(',')?;
    let count = cursor.integer()?;
    cursor.expect(',')?;
    let table = cursor.string()?;
    cursor.expect('.')?;

    let rest: String = chars[cursor.pos..].iter().take(16).collect();
    if !rest.starts_with("split(") {
        return Err(packer_error("symbol table is not split"));
    }
    if !(2..=62).contains(&radix) {
        return Err(packer_error(format!("unsupported radix {}", radix)));
    }

    Ok(Packed {
        payload,
        radix: radix as u32,
        count,
        symbols: table.split('|').map(str::to_string).collect(),
    })
}

impl Packed {
    /// Reconstruct the original program.
    ///
    /// Each whole word of the payload equal to the encoding of some index
    /// below `count` is replaced by its symbol; words whose symbol is empty
    /// stand for themselves.
    pub fn unpack(&self) -> String {
        let lookup: HashMap<String, usize> = (0..self.count)
            .map(|i| (encode_index(i, self.radix), i))
            .collect();
        WORD.replace_all(&self.payload, |caps: &regex_lite::Captures<'_>| {
            let word = &caps[0];
            lookup
                .get(word)
                .and_then(|&i| self.symbols.get(i))
                .filter(|s| !s.is_empty())
                .cloned()
                .unwrap_or_else(|| word.to_string())
        })
        .into_owned()
    }
}

/// Unpack a packed script.
pub fn unpack(source: &str) -> Result<String, ResolveError> {
    Ok(extract(source)?.unpack())
}

/// Unpack and evaluate a packed script that builds an array of URLs.
pub fn unpack_urls(source: &str) -> Result<Vec<String>, ResolveError> {
    let program = unpack(source)?;
    script::evaluate_strings(&program)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKED: &str = include_str!("../../tests/fixtures/dm5_chapterfun.js");
    const UNPACKED: &str = include_str!("../../tests/fixtures/dm5_chapterfun.unpacked.js");

    #[test]
    fn test_encode_index() {
        assert_eq!(encode_index(0, 39), "0");
        assert_eq!(encode_index(10, 39), "a");
        assert_eq!(encode_index(35, 39), "z");
        assert_eq!(encode_index(36, 39), "A");
        assert_eq!(encode_index(38, 39), "C");
        assert_eq!(encode_index(39, 39), "10");
        assert_eq!(encode_index(62 * 62 - 1, 62), "ZZ");
        assert_eq!(encode_index(100, 10), "100");
    }

    #[test]
    fn test_extract_arguments() {
        let packed = extract(PACKED).unwrap();
        assert_eq!(packed.radix, 39);
        assert_eq!(packed.count, 39);
        assert_eq!(packed.symbols.len(), 39);
        assert_eq!(packed.symbols[2], "jpg");
        assert_eq!(packed.symbols[8], "dm5imagefun");
        assert_eq!(packed.symbols[22], "function");
        assert!(packed.symbols[0].is_empty());
        assert!(packed.symbols[13].is_empty());
        assert!(packed.payload.starts_with("m 8(){"));
        // Escaped quotes inside the payload are unescaped.
        assert!(packed.payload.contains("3 6='a'"));
    }

    #[test]
    fn test_unpack_is_byte_exact() {
        assert!(is_packed(PACKED));
        assert_eq!(unpack(PACKED).unwrap(), UNPACKED);
    }

    #[test]
    fn test_unpack_urls() {
        let urls = unpack_urls(PACKED).unwrap();
        assert_eq!(urls.len(), 15);
        assert_eq!(
            urls[0],
            "https://image.dm5.example/1/73/119988/10_9412.jpg?pvalue=119988&key=dm5imagefun&uk=72fa4e46b1d09c3e"
        );
        assert!(urls.iter().all(|u| u.starts_with("https://image.dm5.example/1/73/119988/")));
        assert!(urls[14].contains("/24_9957.jpg?pvalue=119988&"));
    }

    #[test]
    fn test_wrapper_inside_other_text() {
        let wrapped = format!("/* page */ {} ;", PACKED);
        assert_eq!(unpack(&wrapped).unwrap(), UNPACKED);
    }

    #[test]
    fn test_not_packed() {
        let err = unpack("var a = 1;").unwrap_err();
        assert_eq!(err.stage, Stage::Packer);
        assert!(!is_packed("var a = 1;"));
    }

    #[test]
    fn test_truncated_wrapper() {
        let truncated = &PACKED[..PACKED.len() / 2];
        assert!(unpack(truncated).is_err());
    }

    #[test]
    fn test_words_without_symbol_stand_for_themselves() {
        let packed = Packed {
            payload: "0 1 2 zz".to_string(),
            radix: 10,
            count: 3,
            symbols: vec!["".into(), "one".into(), "".into()],
        };
        assert_eq!(packed.unpack(), "0 one 2 zz");
    }
}
