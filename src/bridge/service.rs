use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::bridge::{BridgeHealth, ErrorDetail, ListResponse, ReadRequest, ReadResponse};
use crate::error::{GatewayError, Result};

/// Read/list access to everything below a single root directory.
#[derive(Clone, Debug)]
pub struct FsBridge {
    root: PathBuf,
}

struct Rejection {
    status: StatusCode,
    detail: String,
}

impl Rejection {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorDetail {
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

impl FsBridge {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/list", get(list))
            .route("/read", post(read))
            .with_state(Arc::new(self))
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve_with_listener(listener).await
    }

    pub async fn serve_with_listener(self, listener: tokio::net::TcpListener) -> Result<()> {
        info!(
            root = %self.root.display(),
            addr = ?listener.local_addr().ok(),
            "fs bridge listening"
        );
        axum::serve(listener, self.router())
            .await
            .map_err(|err| GatewayError::Protocol(format!("bridge server error: {err}")))
    }
}

async fn health(State(bridge): State<Arc<FsBridge>>) -> Json<BridgeHealth> {
    Json(BridgeHealth {
        status: "ok".into(),
        root: bridge.root.display().to_string(),
    })
}

async fn list(
    State(bridge): State<Arc<FsBridge>>,
) -> std::result::Result<Json<ListResponse>, Rejection> {
    let root = bridge.root.clone();
    let files = tokio::task::spawn_blocking(move || list_relative_files(&root))
        .await
        .map_err(|err| Rejection::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(ListResponse { files }))
}

async fn read(
    State(bridge): State<Arc<FsBridge>>,
    Json(req): Json<ReadRequest>,
) -> std::result::Result<Json<ReadResponse>, Rejection> {
    let target = resolve_within_root(&bridge.root, &req.path).ok_or_else(|| {
        warn!(path = %req.path, "rejected path outside bridge root");
        Rejection::new(StatusCode::BAD_REQUEST, "Path traversal not allowed")
    })?;

    match fs::metadata(&target).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(Rejection::new(StatusCode::NOT_FOUND, "Not found")),
    }

    let bytes = fs::read(&target)
        .await
        .map_err(|err| Rejection::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(ReadResponse {
        path: req.path,
        content: decode_dropping_invalid(&bytes),
    }))
}

/// Join `relative` onto `root`, refusing absolute paths and any `..` that climbs above the root.
/// The check is lexical; symlinks inside the root are followed as-is.
pub fn resolve_within_root(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => {
                resolved.pop();
                depth -= 1;
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// All regular files below `root` as sorted `/`-separated relative paths.
/// A missing or unreadable root yields an empty listing.
pub fn list_relative_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable bridge entry");
                None
            }
        })
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let parts: Vec<String> = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect();
    files.sort();
    files
}

/// Decode UTF-8, silently dropping byte sequences that are not valid.
pub fn decode_dropping_invalid(bytes: &[u8]) -> String {
    let mut decoded = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                decoded.push_str(valid);
                return decoded;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                decoded.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = err.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            }
        }
    }
}
