//! Play-auth decoding and signed vod queries.
//!
//! The play API hands out a short-lived `playAuth` blob; it carries an STS key
//! pair used to sign a `GetPlayInfo` query against the regional vod endpoint.

use std::collections::BTreeMap;

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha1::Sha1;

use crate::fetch::{FetchSession, RequestOptions};

use super::{ResolveError, Stage};

type HmacSha1 = Hmac<Sha1>;

const API_VERSION: &str = "2017-03-21";
const AUTH_TIMEOUT_SECS: u32 = 7200;

/// Credentials carried by a `playAuth` blob.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayAuth {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "string_or_json")]
    pub auth_info: String,
}

fn string_or_json<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Decode a Base64url (padding optional) `playAuth` blob.
pub fn decode_play_auth(play_auth: &str) -> Result<PlayAuth, ResolveError> {
    let trimmed = play_auth.trim();
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(trimmed))
        .or_else(|_| STANDARD.decode(trimmed))
        .map_err(|_| ResolveError::new(Stage::PlayAuth, "playAuth is not base64"))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ResolveError::new(Stage::PlayAuth, format!("playAuth payload: {}", e)))
}

/// RFC 3986 percent-encoding; only unreserved characters pass through.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sorted `key=value` pairs joined by `&`, both sides percent-encoded.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(canonical: &str) -> String {
    format!("GET&{}&{}", percent_encode("/"), percent_encode(canonical))
}

/// `base64(HMAC-SHA1(secret + "&", string_to_sign))`
pub fn sign(params: &BTreeMap<String, String>, secret: &str) -> Result<String, ResolveError> {
    let mut mac = HmacSha1::new_from_slice(format!("{}&", secret).as_bytes())
        .map_err(|e| ResolveError::new(Stage::Sign, e.to_string()))?;
    mac.update(string_to_sign(&canonical_query(params)).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Parameters of a `GetPlayInfo` call, signature excluded.
pub fn play_info_params(
    auth: &PlayAuth,
    video_id: &str,
    nonce: &str,
    timestamp: DateTime<Utc>,
) -> BTreeMap<String, String> {
    let pairs = [
        ("Action", "GetPlayInfo".to_string()),
        ("Format", "JSON".to_string()),
        ("Version", API_VERSION.to_string()),
        ("AccessKeyId", auth.access_key_id.clone()),
        ("SignatureMethod", "HMAC-SHA1".to_string()),
        ("SignatureVersion", "1.0".to_string()),
        ("SignatureNonce", nonce.to_string()),
        (
            "Timestamp",
            timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ),
        ("VideoId", video_id.to_string()),
        ("SecurityToken", auth.security_token.clone()),
        ("AuthInfo", auth.auth_info.clone()),
        ("AuthTimeout", AUTH_TIMEOUT_SECS.to_string()),
        ("Channel", "HTML5".to_string()),
        ("StreamType", "video".to_string()),
        ("Formats", "m3u8,mp4".to_string()),
    ];
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

pub fn endpoint_for(region: &str) -> String {
    format!("https://vod.{}.aliyuncs.com/", region)
}

/// Full signed request URL.
pub fn signed_url(
    endpoint: &str,
    auth: &PlayAuth,
    video_id: &str,
    nonce: &str,
    timestamp: DateTime<Utc>,
) -> Result<String, ResolveError> {
    let params = play_info_params(auth, video_id, nonce, timestamp);
    let signature = sign(&params, &auth.access_key_secret)?;
    Ok(format!(
        "{}?{}&Signature={}",
        endpoint,
        canonical_query(&params),
        percent_encode(&signature)
    ))
}

/// First `PlayInfoList.PlayInfo[].PlayURL` of a `GetPlayInfo` response.
pub fn first_play_url(response: &Value) -> Result<String, ResolveError> {
    response
        .pointer("/PlayInfoList/PlayInfo")
        .and_then(Value::as_array)
        .and_then(|infos| {
            infos
                .iter()
                .filter_map(|info| info.get("PlayURL").and_then(Value::as_str))
                .find(|url| !url.is_empty())
        })
        .map(str::to_string)
        .ok_or_else(|| ResolveError::new(Stage::Sign, "response has no PlayURL"))
}

/// Resolve a stream URL from a `playAuth` blob.
///
/// `endpoint` overrides the regional endpoint derived from the blob or from
/// `region`.
pub async fn resolve(
    session: &FetchSession,
    play_auth: &str,
    video_id: &str,
    region: Option<&str>,
    endpoint: Option<&str>,
) -> Result<String, ResolveError> {
    let auth = decode_play_auth(play_auth)?;
    let endpoint = match endpoint {
        Some(endpoint) => endpoint.to_string(),
        None => {
            let region = auth
                .region
                .as_deref()
                .or(region)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| ResolveError::new(Stage::PlayAuth, "no region"))?;
            endpoint_for(region)
        }
    };

    let nonce = uuid::Uuid::new_v4().to_string();
    let url = signed_url(&endpoint, &auth, video_id, &nonce, Utc::now())?;
    let response: Value = session
        .get_json(&url, &RequestOptions::api())
        .await
        .ok_or_else(|| ResolveError::fetch("GetPlayInfo request failed"))?;
    first_play_url(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PLAY_AUTH: &str = "eyJBY2Nlc3NLZXlJZCI6IlNUUy5BS0lEIiwiQWNjZXNzS2V5U2VjcmV0IjoiU0VDIiwiU2VjdXJpdHlUb2tlbiI6IlRPS0VOKy89IiwiUmVnaW9uIjoiY24tc2hhbmdoYWkiLCJBdXRoSW5mbyI6IntcImFcIjoxfSJ9";

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_reference_signature() {
        let p = params(&[
            ("Action", "GetPlayInfo"),
            ("Timestamp", "2024-01-01T00:00:00Z"),
            ("SignatureNonce", "N"),
            ("Format", "JSON"),
            ("Version", "2017-03-21"),
            ("VideoId", "V"),
            ("AccessKeyId", "AKID"),
        ]);
        assert_eq!(
            canonical_query(&p),
            "AccessKeyId=AKID&Action=GetPlayInfo&Format=JSON&SignatureNonce=N&Timestamp=2024-01-01T00%3A00%3A00Z&Version=2017-03-21&VideoId=V"
        );
        assert_eq!(
            string_to_sign(&canonical_query(&p)),
            "GET&%2F&AccessKeyId%3DAKID%26Action%3DGetPlayInfo%26Format%3DJSON%26SignatureNonce%3DN%26Timestamp%3D2024-01-01T00%253A00%253A00Z%26Version%3D2017-03-21%26VideoId%3DV"
        );
        assert_eq!(sign(&p, "SEC").unwrap(), "NKODkxGMQ9/nV9v4uTasezkV118=");
    }

    #[test]
    fn test_percent_encode_unreserved_only() {
        assert_eq!(percent_encode("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(percent_encode("a b+c/d=e*"), "a%20b%2Bc%2Fd%3De%2A");
    }

    #[test]
    fn test_decode_play_auth() {
        let auth = decode_play_auth(PLAY_AUTH).unwrap();
        assert_eq!(auth.access_key_id, "STS.AKID");
        assert_eq!(auth.access_key_secret, "SEC");
        assert_eq!(auth.security_token, "TOKEN+/=");
        assert_eq!(auth.region.as_deref(), Some("cn-shanghai"));
        assert_eq!(auth.auth_info, r#"{"a":1}"#);

        let padded = format!("{}==", PLAY_AUTH);
        assert!(decode_play_auth(&padded).is_ok());
    }

    #[test]
    fn test_decode_play_auth_errors() {
        assert_eq!(decode_play_auth("%%%").unwrap_err().stage, Stage::PlayAuth);
        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert_eq!(decode_play_auth(&not_json).unwrap_err().stage, Stage::PlayAuth);
    }

    #[test]
    fn test_play_info_params_fixed_set() {
        let auth = decode_play_auth(PLAY_AUTH).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let p = play_info_params(&auth, "V", "N", ts);
        assert_eq!(p.len(), 15);
        assert_eq!(p["Timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(p["Formats"], "m3u8,mp4");
        assert_eq!(p["AuthTimeout"], "7200");
        assert_eq!(p["SecurityToken"], "TOKEN+/=");
    }

    #[test]
    fn test_signed_url_shape() {
        let auth = decode_play_auth(PLAY_AUTH).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let url = signed_url(&endpoint_for("cn-shanghai"), &auth, "V", "N", ts).unwrap();
        assert!(url.starts_with("https://vod.cn-shanghai.aliyuncs.com/?AccessKeyId=STS.AKID&"));
        assert!(url.contains("&SecurityToken=TOKEN%2B%2F%3D&"));
        let signature = url.rsplit("&Signature=").next().unwrap();
        let expected = sign(&play_info_params(&auth, "V", "N", ts), "SEC").unwrap();
        assert_eq!(urlencoding::decode(signature).unwrap(), expected);
    }

    #[test]
    fn test_first_play_url() {
        let response = serde_json::json!({
            "PlayInfoList": {"PlayInfo": [
                {"PlayURL": "", "Format": "mp4"},
                {"PlayURL": "https://vod.example/v.m3u8", "Format": "m3u8"}
            ]}
        });
        assert_eq!(first_play_url(&response).unwrap(), "https://vod.example/v.m3u8");
        let err = first_play_url(&serde_json::json!({"Code": "Forbidden"})).unwrap_err();
        assert_eq!(err.stage, Stage::Sign);
    }
}
