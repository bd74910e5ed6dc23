//! API Handlers
//!
//! The eight public endpoints of the coordinator. Handlers stay thin: they
//! parse arguments, call into the storage core, and wrap failures into the
//! error envelope with the code of the failing point.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Extension, Multipart, Query};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use super::error::{ApiCode, ApiError};
use crate::cluster::service::Cluster;
use crate::config::Config;
use crate::storage::memory::Storage;
use crate::storage::types::{FileRecord, MIME_UNKNOWN};
use crate::storage::upload::{store_file, UploadError};

// HTTP error messages
const ERR_NO_JSON: &str = "data not given";
const ERR_NO_DATA: &str = "data is empty";
const ERR_NOT_FOUND: &str = "404 file not found";
const ERR_ARG_BAD_ID: &str = "file ID can not be parsed as an integer";
const ERR_NODE_HAS: &str = "node with given address already present";

/// Fetches and unmarshals the JSON request argument.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request(ERR_NO_JSON, ApiCode::NoReq));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(e, ApiCode::BadJson))
}

/// File selector accepted by fileinfo and remove: by id, or by name when
/// the id is absent.
#[derive(Debug, Default, Deserialize)]
pub struct FileArg {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Ping helper to check transaction latency and webserver health; echoes
/// the request body.
pub async fn handle_ping(body: Bytes) -> Bytes {
    body
}

/// Returns the array with the sum size of all chunks on each node.
pub async fn handle_nodesize(Extension(storage): Extension<Arc<Storage>>) -> Json<Vec<i64>> {
    Json(storage.snapshot_sizes().await)
}

/// Uploads one file from the `datafile` multipart field.
pub async fn handle_upload(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(cfg): Extension<Arc<Config>>,
    mut multipart: Multipart,
) -> Result<Json<FileRecord>, ApiError> {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("datafile") => break field,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return Err(ApiError::bad_request(ERR_NO_DATA, ApiCode::UploadForm));
            }
            Err(e) => return Err(ApiError::bad_request(e, ApiCode::UploadForm)),
        }
    };

    let name = field.file_name().unwrap_or_default().to_string();
    let mime = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| MIME_UNKNOWN.to_string());
    let body = field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(e, ApiCode::BadBody))?;

    let record = store_file(&storage, &cfg.storage, name, mime, body)
        .await
        .map_err(upload_error)?;
    Ok(Json(record.as_ref().clone()))
}

fn upload_error(e: UploadError) -> ApiError {
    let code = match &e {
        UploadError::NotConnected { .. } => ApiCode::UploadWrite,
        UploadError::Stream { .. } => ApiCode::UploadSend1,
        UploadError::Receipt { .. } => ApiCode::UploadReply,
    };
    ApiError::internal(e, code)
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Streams the file back, chunk by chunk in plan order. Bytes already sent
/// stay sent if a node read fails mid-stream.
pub async fn handle_download(
    Extension(storage): Extension<Arc<Storage>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let mut file_id: u64 = 0;
    if let Some(s) = query.id.as_deref().filter(|s| !s.is_empty()) {
        file_id = s
            .parse()
            .map_err(|_| ApiError::bad_request(ERR_ARG_BAD_ID, ApiCode::DownloadBadId))?;
    }
    let name = query.name.unwrap_or_default();
    if file_id == 0 && name.is_empty() {
        return Err(ApiError::bad_request(ERR_NO_DATA, ApiCode::DownloadNoArg));
    }

    let record = storage
        .find(file_id, &name)
        .ok_or_else(|| ApiError::not_found(ERR_NOT_FOUND, ApiCode::DownloadAbsent))?;

    let stream = {
        let storage = storage.clone();
        let record = record.clone();
        futures_util::stream::try_unfold(0usize, move |idx| {
            let storage = storage.clone();
            let record = record.clone();
            async move {
                let Some(rng) = record.chunks.get(idx).copied() else {
                    return Ok::<_, anyhow::Error>(None);
                };
                let client = storage.client(rng.node_id).await.ok_or_else(|| {
                    anyhow::anyhow!("node {} has no live connection", rng.node_id)
                })?;
                let payload = client.read(rng).await?;
                Ok(Some((payload, idx + 1)))
            }
        })
    };

    let mime = HeaderValue::from_str(&record.mime)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let mut resp = Body::from_stream(stream).into_response();
    resp.headers_mut().insert(CONTENT_TYPE, mime);
    resp.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(record.size as u64));
    Ok(resp)
}

/// Returns the record of the pointed file, or null if it is absent.
pub async fn handle_fileinfo(
    Extension(storage): Extension<Arc<Storage>>,
    body: Bytes,
) -> Result<Json<Option<FileRecord>>, ApiError> {
    let arg: FileArg = parse_body(&body)?;
    if arg.id == 0 && arg.name.is_empty() {
        return Err(ApiError::bad_request(ERR_NO_DATA, ApiCode::FileInfoNoArg));
    }
    Ok(Json(
        storage.find(arg.id, &arg.name).map(|r| r.as_ref().clone()),
    ))
}

/// Deletes all chunks of the pointed file from the nodes; returns the
/// record of the removed file.
pub async fn handle_remove(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(cfg): Extension<Arc<Config>>,
    body: Bytes,
) -> Result<Json<FileRecord>, ApiError> {
    let arg: FileArg = parse_body(&body)?;
    if arg.id == 0 && arg.name.is_empty() {
        return Err(ApiError::bad_request(ERR_NO_DATA, ApiCode::RemoveNoArg));
    }

    let record = storage
        .find(arg.id, &arg.name)
        .ok_or_else(|| ApiError::not_found(ERR_NOT_FOUND, ApiCode::RemoveAbsent))?;

    // the file is unreachable from here on, even if node deletes fail
    storage.delete(&record).await;

    let mut last_err = None;
    for rng in &record.chunks {
        match storage.client(rng.node_id).await {
            Some(client) => {
                if let Err(e) = client.remove(rng.file_id, cfg.storage.api_timeout).await {
                    last_err = Some(e);
                }
            }
            None => {
                last_err = Some(anyhow::anyhow!(
                    "node {} has no live connection",
                    rng.node_id
                ));
            }
        }
    }
    if let Some(e) = last_err {
        return Err(ApiError::internal(e, ApiCode::RemoveNode));
    }

    Ok(Json(record.as_ref().clone()))
}

/// Deletes all data at the storage, purges the nodes, and resets the file
/// id counter.
pub async fn handle_clear(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(cfg): Extension<Arc<Config>>,
) -> Result<Json<()>, ApiError> {
    storage.clear().await;

    // purge in locked state, so no upload lands between the sweeps
    let mut last_err = None;
    {
        let nodes = storage.nodes.write().await;
        for entry in nodes.iter() {
            let Some(client) = entry.client.clone() else {
                continue;
            };
            if let Err(e) = client.purge(cfg.storage.api_timeout).await {
                last_err = Some(e);
            }
        }
    }
    if let Some(e) = last_err {
        return Err(ApiError::internal(e, ApiCode::ClearNode));
    }

    info!("content is cleared");
    Ok(Json(()))
}

#[derive(Debug, Default, Deserialize)]
pub struct AddNodeArg {
    #[serde(default)]
    pub addr: String,
}

/// Adds a new node to the composition at runtime and waits until its
/// connection is established; returns the index of the added node.
pub async fn handle_addnode(
    Extension(cluster): Extension<Arc<Cluster>>,
    body: Bytes,
) -> Result<Json<u32>, ApiError> {
    let arg: AddNodeArg = parse_body(&body)?;
    if arg.addr.is_empty() {
        return Err(ApiError::bad_request(ERR_NO_DATA, ApiCode::AddNodeNoData));
    }
    match cluster.add_node(&arg.addr).await {
        Some(node_id) => Ok(Json(node_id)),
        None => Err(ApiError::bad_request(ERR_NODE_HAS, ApiCode::AddNodeHas)),
    }
}
