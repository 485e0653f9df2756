use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Builder for response cache keys.
///
/// The key is the SHA-256 hex of the canonical JSON of
/// `{prefix, handler, path, args, query}`; maps are serialized with sorted
/// keys, so argument order never matters.
#[derive(Debug, Clone, Default)]
pub struct CacheKey {
    prefix: String,
    handler: String,
    path: String,
    args: BTreeMap<String, Value>,
    query: BTreeMap<String, Value>,
}

fn to_json<T: Serialize + Debug + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(format!("{:?}", value)))
}

impl CacheKey {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn arg<T: Serialize + Debug + ?Sized>(mut self, name: &str, value: &T) -> Self {
        self.args.insert(name.to_string(), to_json(value));
        self
    }

    pub fn query<T: Serialize + Debug + ?Sized>(mut self, name: &str, value: &T) -> Self {
        self.query.insert(name.to_string(), to_json(value));
        self
    }

    /// Canonical JSON text the key is hashed from.
    pub fn canonical(&self) -> String {
        let mut root = serde_json::Map::new();
        root.insert("prefix".into(), Value::String(self.prefix.clone()));
        root.insert("handler".into(), Value::String(self.handler.clone()));
        root.insert("path".into(), Value::String(self.path.clone()));
        root.insert("args".into(), to_json(&self.args));
        root.insert("query".into(), to_json(&self.query));
        canonical_value(&Value::Object(root)).to_string()
    }

    pub fn build(&self) -> String {
        hex::encode(Sha256::digest(self.canonical().as_bytes()))
    }
}

/// Rebuild nested objects through a sorted map.
fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical_value(v))).collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}
