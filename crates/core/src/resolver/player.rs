//! `player_aaaa` decoding and the AES-encrypted parser page.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use serde_json::Value;
use tracing::debug;

use crate::fetch::{FetchSession, RequestOptions};

use super::cipher::base64_lenient;
use super::{is_direct_stream, literal, looks_like_url, ResolveError, Stage};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const PARSER_IV: &[u8; 16] = b"2F131BE91247866E";

/// Player descriptor embedded in a mirror play page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerData {
    pub url: String,
    pub encrypt: u8,
    pub from: Option<String>,
}

impl PlayerData {
    pub fn from_value(value: &Value) -> Option<Self> {
        let url = literal::string_field(value, "url")?;
        let encrypt = literal::string_field(value, "encrypt")
            .and_then(|e| e.trim().parse().ok())
            .unwrap_or(0);
        Some(Self {
            url,
            encrypt,
            from: literal::string_field(value, "from").filter(|f| !f.is_empty()),
        })
    }
}

/// Extract `player_aaaa` from a play page.
pub fn extract_player(page: &str) -> Result<PlayerData, ResolveError> {
    let value = literal::object(page, "player_aaaa")
        .ok_or_else(|| ResolveError::new(Stage::Script, "page has no player_aaaa"))?;
    PlayerData::from_value(&value)
        .ok_or_else(|| ResolveError::new(Stage::Script, "player_aaaa has no url"))
}

/// Percent-decode, including the `%uXXXX` form produced by `escape()`.
pub fn unescape(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if bytes.get(i + 1).is_some_and(|b| *b == b'u' || *b == b'U') {
                let code = input
                    .get(i + 2..i + 6)
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .and_then(char::from_u32);
                if let Some(c) = code {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    i += 6;
                    continue;
                }
            } else if let Some(b) = input
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn base64_text(value: &str) -> Option<String> {
    base64_lenient(value).and_then(|b| String::from_utf8(b).ok())
}

fn hex_text(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.len() % 2 != 0 || !value.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }
    hex::decode(value).ok().and_then(|b| String::from_utf8(b).ok())
}

/// Decode `player_aaaa.url` according to its `encrypt` flag.
pub fn decode_player_url(url: &str, encrypt: u8) -> Result<String, ResolveError> {
    let decoded = match encrypt {
        0 => url.to_string(),
        1 => unescape(url),
        2 => {
            // Sites disagree on whether the escape happens before or after
            // the Base64 step, so undo both.
            let inner = base64_text(&unescape(url))
                .ok_or_else(|| ResolveError::new(Stage::Cipher, "encrypt=2 value is not base64"))?;
            unescape(&inner)
        }
        3 => decode_layered(url),
        other => {
            debug!(encrypt = other, "Unknown player encrypt flag, using url as is");
            url.to_string()
        }
    };
    let decoded = decoded.trim().to_string();
    if decoded.is_empty() {
        return Err(ResolveError::new(Stage::Cipher, "decoded player url is empty"));
    }
    Ok(decoded)
}

fn decode_layered(url: &str) -> String {
    let mut value = url.trim().to_string();
    if looks_like_url(&value) {
        return value;
    }
    if let Some(text) = hex_text(&value) {
        value = text;
        if looks_like_url(&value) {
            return value;
        }
    }
    if let Some(text) = base64_text(&value) {
        value = text;
        if looks_like_url(&value) {
            return value;
        }
    }
    unescape(&value)
}

/// AES key for a parser page: `"2890" + uid + "tB959C"`, zero-padded or
/// truncated to 16 bytes.
pub fn parser_key(uid: &str) -> [u8; 16] {
    let mut key = [0u8; 16];
    let material = format!("2890{}tB959C", uid);
    for (slot, byte) in key.iter_mut().zip(material.bytes()) {
        *slot = byte;
    }
    key
}

/// Decrypt `ConFig.url` (Base64 AES-128-CBC/PKCS#7).
pub fn decrypt_config_url(ciphertext: &str, uid: &str) -> Result<String, ResolveError> {
    let data = base64_lenient(ciphertext)
        .ok_or_else(|| ResolveError::new(Stage::Parser, "ConFig.url is not base64"))?;
    let decryptor = Aes128CbcDec::new_from_slices(&parser_key(uid), PARSER_IV)
        .map_err(|e| ResolveError::new(Stage::Parser, e.to_string()))?;
    let plain = decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(&data)
        .map_err(|_| ResolveError::new(Stage::Parser, "bad padding, wrong uid?"))?;
    String::from_utf8(plain)
        .map_err(|_| ResolveError::new(Stage::Parser, "decrypted url is not UTF-8"))
}

/// `(ConFig.url, ConFig.config.uid)` of a parser page.
pub fn parser_config(page: &str) -> Result<(String, String), ResolveError> {
    let config = literal::object(page, "ConFig")
        .ok_or_else(|| ResolveError::new(Stage::Parser, "page has no ConFig"))?;
    let url = literal::string_field(&config, "url")
        .ok_or_else(|| ResolveError::new(Stage::Parser, "ConFig has no url"))?;
    let uid = config
        .get("config")
        .and_then(|c| literal::string_field(c, "uid"))
        .ok_or_else(|| ResolveError::new(Stage::Parser, "ConFig has no config.uid"))?;
    Ok((url, uid))
}

fn with_scheme(url: String) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url,
    }
}

/// Resolve a player descriptor to a stream URL.
///
/// Direct `.m3u8`/`.mp4` values are returned as is; anything else goes through
/// the parser page when one is configured.
pub async fn resolve(
    session: &FetchSession,
    player: &PlayerData,
    parser_url: Option<&str>,
) -> Result<String, ResolveError> {
    let decoded = decode_player_url(&player.url, player.encrypt)?;
    if is_direct_stream(&decoded) {
        return Ok(with_scheme(decoded));
    }

    match parser_url.filter(|p| !p.is_empty()) {
        Some(parser) => {
            let page = session
                .get_with(
                    &format!("{}{}", parser, decoded),
                    &RequestOptions::new()
                        .referer(session.base_url().as_str())
                        .insecure(),
                )
                .await
                .ok_or_else(|| ResolveError::fetch("parser page request failed"))?;
            let (ciphertext, uid) = parser_config(page.text())?;
            let url = decrypt_config_url(&ciphertext, &uid)?;
            if looks_like_url(&url) {
                Ok(with_scheme(url))
            } else {
                Err(ResolveError::new(Stage::Parser, "parser returned no url"))
            }
        }
        None if looks_like_url(&decoded) => Ok(with_scheme(decoded)),
        None => Err(ResolveError::new(
            Stage::Parser,
            format!("no parser configured for player {:?}", player.from),
        )),
    }
}
