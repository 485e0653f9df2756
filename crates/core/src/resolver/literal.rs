//! Extraction of object literals embedded in page scripts.
//!
//! Pages assign configuration objects to globals (`player_aaaa = {…}`,
//! `ConFig = {…}`, `_conf = {…}`). The blobs may contain `}` inside quoted
//! strings, so they are located with a string- and escape-aware brace scan
//! rather than a regex, then parsed as JSON after normalising the usual
//! script-isms (single quotes, bare keys, trailing commas).

use serde_json::Value;

/// Slice of the object literal assigned to `name`.
///
/// Matches `name = {`, `name={` and `name: {`, skipping occurrences where
/// `name` is only a suffix of a longer identifier.
pub fn object_literal<'a>(source: &'a str, name: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(found) = source[search_from..].find(name) {
        let at = search_from + found;
        search_from = at + name.len();

        let preceded_by_ident = source[..at]
            .chars()
            .next_back()
            .map(|c| c.is_alphanumeric() || c == '_' || c == '$')
            .unwrap_or(false);
        if preceded_by_ident {
            continue;
        }

        let rest = source[at + name.len()..].trim_start();
        let Some(rest) = rest
            .strip_prefix('=')
            .or_else(|| rest.strip_prefix(':'))
            .map(str::trim_start)
        else {
            continue;
        };
        if !rest.starts_with('{') {
            continue;
        }
        let start = source.len() - rest.len();
        if let Some(end) = balanced_end(&source[start..]) {
            return Some(&source[start..start + end]);
        }
    }
    None
}

/// Byte length of the balanced `{…}` at the start of `source`.
fn balanced_end(source: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in source.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite a script object literal into strict JSON.
fn normalise(literal: &str) -> String {
    let chars: Vec<char> = literal.chars().collect();
    let mut out = String::with_capacity(literal.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
                out.extend(&chars[start..i.min(chars.len())]);
                continue;
            }
            '\'' => {
                i += 1;
                let mut text = String::new();
                while i < chars.len() && chars[i] != '\'' {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                        match chars[i] {
                            'n' => text.push('\n'),
                            't' => text.push('\t'),
                            other => text.push(other),
                        }
                    } else {
                        text.push(chars[i]);
                    }
                    i += 1;
                }
                i += 1;
                out.push_str(&Value::String(text).to_string());
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(',');
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let is_key = chars[i..]
                    .iter()
                    .find(|c| !c.is_whitespace())
                    .map(|c| *c == ':')
                    .unwrap_or(false);
                if is_key {
                    out.push_str(&Value::String(word).to_string());
                } else if matches!(word.as_str(), "true" | "false" | "null") {
                    out.push_str(&word);
                } else {
                    // Bare identifiers reference other globals; keep them as text.
                    out.push_str(&Value::String(word).to_string());
                }
                continue;
            }
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Parse an object literal, accepting strict JSON or common script syntax.
pub fn parse(literal: &str) -> Option<Value> {
    serde_json::from_str(literal)
        .ok()
        .or_else(|| serde_json::from_str(&normalise(literal)).ok())
}

/// Locate and parse the object assigned to `name`.
pub fn object(source: &str, name: &str) -> Option<Value> {
    parse(object_literal(source, name)?)
}

/// Field of a JSON object as a string, accepting numbers.
pub fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
