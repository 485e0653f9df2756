//! In-process upstream sites for adapter tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::{DownloadConfig, Domain, SourceConfig};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}

/// A minimal source row pointing at `base_url`.
pub fn source_row(id: &str, domain: Domain, base_url: &str) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        base_url: base_url.to_string(),
        domain,
        enabled: true,
        proxy: None,
        download: DownloadConfig::default(),
        options: BTreeMap::new(),
    }
}

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Read a UTF-8 file from `tests/fixtures`.
pub fn fixture(name: &str) -> String {
    let path = fixture_path(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e))
}

/// Read a fixture as raw bytes, for pages in legacy encodings.
pub fn fixture_bytes(name: &str) -> Vec<u8> {
    let path = fixture_path(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e))
}

/// Read a fixture and point its absolute links at a local server.
pub fn fixture_at(name: &str, base_url: &str) -> String {
    fixture(name).replace("{{BASE}}", base_url)
}
