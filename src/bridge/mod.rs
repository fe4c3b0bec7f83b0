//! Filesystem bridge: a path-sandboxed list/read service and the HTTP client
//! the filesystem tools use to reach it.
//!
//! The wire format mirrors the service routes:
//! - `GET /health` -> `{"status": "ok", "root": "<root>"}`
//! - `GET /list` -> `{"files": ["a.txt", "nested/b.txt"]}`
//! - `POST /read` with `{"path": "a.txt"}` -> `{"path": "a.txt", "content": "..."}`
//!
//! Failures are reported with a non-2xx status and a `{"detail": "..."}` body.

mod client;
#[cfg(feature = "server")]
mod service;

use serde::{Deserialize, Serialize};

pub use client::BridgeClient;
#[cfg(feature = "server")]
pub use service::{decode_dropping_invalid, list_relative_files, resolve_within_root, FsBridge};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeHealth {
    pub status: String,
    pub root: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub path: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Pull the human readable reason out of an error body, falling back to the raw text.
pub fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorDetail>(body)
        .map(|parsed| parsed.detail)
        .unwrap_or_else(|_| body.trim().to_string())
}
