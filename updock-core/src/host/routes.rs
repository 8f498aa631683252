//! Route handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::archive::stream_package;
use crate::catalog::{ensure_single_component, VersionStore, LATEST};
use crate::error::HostError;
use crate::protocol::{self, HealthResponse, VersionsResponse, VERSION_QUERY_KEY};

/// Shared handler state
#[derive(Debug, Clone)]
pub struct HostState {
    pub store: Arc<VersionStore>,
}

impl HostState {
    pub fn new(store: VersionStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// Run filesystem-bound catalog work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T, HostError>
where
    F: FnOnce() -> Result<T, HostError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| HostError::CatalogRead {
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?
}

/// `GET /versions`
pub(crate) async fn versions(
    State(state): State<HostState>,
) -> Result<Json<VersionsResponse>, HostError> {
    let store = Arc::clone(&state.store);
    let catalog = blocking(move || store.list_versions()).await?;

    Ok(Json(VersionsResponse {
        latest: catalog.latest().map(|v| v.to_string()),
        versions: catalog.names(),
    }))
}

/// `GET /updates?version=<id>|LATEST`
pub(crate) async fn updates(
    State(state): State<HostState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, HostError> {
    let requested = params
        .get(VERSION_QUERY_KEY)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(LATEST)
        .to_string();

    // reject traversal attempts before they can surface as "not found"
    ensure_single_component(&requested)?;

    let store = Arc::clone(&state.store);
    let lookup = requested.clone();
    let (version, package_dir) = blocking(move || {
        let version = store.resolve(&lookup)?;
        let package_dir = store.package_path(&version)?;
        Ok((version, package_dir))
    })
    .await?;

    tracing::info!("Serving package {} (requested '{}')", version, requested);

    let stream = stream_package(package_dir, version.to_string());
    let headers = [
        (header::CONTENT_TYPE, protocol::ARCHIVE_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            protocol::attachment_header(version.as_str()),
        ),
    ];

    Ok((headers, Body::from_stream(stream)).into_response())
}

/// `GET /health`
pub(crate) async fn health(
    State(state): State<HostState>,
) -> Result<Json<HealthResponse>, HostError> {
    let store = Arc::clone(&state.store);
    let catalog = blocking(move || store.list_versions()).await?;

    Ok(Json(HealthResponse {
        status: "OK".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        versions: catalog.names(),
    }))
}
