//! ROT13 + Base64 + ROT13 audio URL chains.
//!
//! Audio pages declare `_conf = { a: [...], b: [...] }`. Each entry decrypts
//! as `rot13(base64(rot13(entry)))` to one or more comma-separated URLs; the
//! flattened list lines up with the page's episode list.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde_json::Value;

use super::literal;
use super::{ResolveError, Stage};

pub fn rot13(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            _ => c,
        })
        .collect()
}

/// Base64 with or without padding.
pub(crate) fn base64_lenient(input: &str) -> Option<Vec<u8>> {
    let trimmed = input.trim();
    STANDARD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed.trim_end_matches('=')))
        .ok()
}

/// Decrypt one `_conf` entry.
pub fn decrypt_entry(entry: &str) -> Result<String, ResolveError> {
    let bytes = base64_lenient(&rot13(entry))
        .ok_or_else(|| ResolveError::new(Stage::Cipher, "entry is not base64"))?;
    let inner = String::from_utf8(bytes)
        .map_err(|_| ResolveError::new(Stage::Cipher, "entry is not UTF-8"))?;
    Ok(rot13(&inner))
}

/// Decrypted audio URLs of one program page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioTable {
    pub primary: Vec<String>,
    pub backup: Vec<String>,
}

impl AudioTable {
    /// URLs of 1-based episode `number`.
    pub fn episode(&self, number: usize) -> Option<(String, Option<String>)> {
        let index = number.checked_sub(1)?;
        let primary = self.primary.get(index)?.clone();
        Some((primary, self.backup.get(index).cloned()))
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }
}

fn decrypt_list(value: Option<&Value>) -> Result<Vec<String>, ResolveError> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut urls = Vec::new();
    for entry in entries.iter().filter_map(Value::as_str) {
        let plain = decrypt_entry(entry)?;
        urls.extend(
            plain
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
        );
    }
    Ok(urls)
}

/// Locate `_conf` in a page and decrypt its URL lists.
pub fn decode_conf(page: &str) -> Result<AudioTable, ResolveError> {
    let conf = literal::object(page, "_conf")
        .ok_or_else(|| ResolveError::new(Stage::Cipher, "no _conf object"))?;
    let primary = decrypt_list(conf.get("a"))?;
    if primary.is_empty() {
        return Err(ResolveError::new(Stage::Cipher, "_conf.a is empty"));
    }
    let backup = decrypt_list(conf.get("b"))?;
    Ok(AudioTable { primary, backup })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_URLS: &str =
        "qJqaL2L6Yl9hnUS2Lv5ln256L3ylYmNjZF56LmZfqJqaL2L6Yl9hnUS2Lv5ln256L3ylYmNjZv56LmZ=";
    const THIRD_URL: &str = "qJqaL2L6Yl9hnUS2Lv5ln256L3ylYmNjZl56LmZ=";
    const BACKUPS: &str = "qJqaL2L6Yl9ioaO4nTZhpzghrzA5pv8jZQRhrzZmYUIaM2AzBv8io25jrTuwYaWeoacwrKViZQNlYacwZlk1M2qwMwbiY29hpUubLl5ln256L3ylYmNjZl56LmZ=";

    #[test]
    fn test_rot13_is_involution() {
        assert_eq!(rot13("Hello, World!"), "Uryyb, Jbeyq!");
        assert_eq!(rot13(&rot13("abcXYZ123")), "abcXYZ123");
    }

    #[test]
    fn test_decrypt_entry() {
        assert_eq!(
            decrypt_entry(TWO_URLS).unwrap(),
            "https://audio.example/001.mp3,https://audio.example/002.mp3"
        );
    }

    #[test]
    fn test_decrypt_entry_without_padding() {
        let unpadded = TWO_URLS.trim_end_matches('=');
        assert!(decrypt_entry(unpadded).unwrap().starts_with("https://audio.example/001"));
    }

    #[test]
    fn test_decode_conf_flattens_entries() {
        let page = format!(
            "<script>var _conf = {{ a: ['{}', '{}'], b: ['{}'] }};</script>",
            TWO_URLS, THIRD_URL, BACKUPS
        );
        let table = decode_conf(&page).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.episode(1),
            Some((
                "https://audio.example/001.mp3".to_string(),
                Some("https://backup.example/001.mp3".to_string())
            ))
        );
        assert_eq!(table.episode(3).unwrap().0, "https://audio.example/003.mp3");
        assert!(table.episode(0).is_none());
        assert!(table.episode(4).is_none());
    }

    #[test]
    fn test_decode_conf_without_backup() {
        let page = format!(r#"var _conf={{"a":["{}"]}}"#, TWO_URLS);
        let table = decode_conf(&page).unwrap();
        assert_eq!(table.episode(2).unwrap().1, None);
    }

    #[test]
    fn test_missing_conf() {
        let err = decode_conf("<html></html>").unwrap_err();
        assert_eq!(err.stage, Stage::Cipher);
    }

    #[test]
    fn test_garbage_entry() {
        let err = decode_conf("var _conf = {a: ['***']};").unwrap_err();
        assert_eq!(err.stage, Stage::Cipher);
    }
}
