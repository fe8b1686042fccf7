//! HTTP surface: list, append, and delete over one collection key.
//!
//! Every mutation is a full read-modify-write of the stored JSON array.
//! There is no cross-request isolation; concurrent writers race and the
//! last write wins, which is an accepted limit for this gallery's traffic.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{task, time::timeout};
use tracing::{info, warn};

use crate::{
    collection::{
        self, Collection, IMAGE_CONTENT_LIMIT, LARGE_IMAGE_THRESHOLD, Record, TEXT_CONTENT_LIMIT,
    },
    compress::recompress_base64_image,
    error::AppError,
    state::State as AppState,
};

const REQUIRED_FIELDS: [&str; 4] = ["type", "content", "name", "city"];

/// Recompression is CPU-bound and runs off the async runtime; a pathological
/// payload gets cut off rather than stalling the request forever.
const COMPRESSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub collection: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub success: bool,
    pub collection: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub removed: usize,
    pub remaining: usize,
    pub collection: Vec<Record>,
}

#[derive(Deserialize)]
pub struct DeleteParams {
    pub action: Option<String>,
    pub timestamp: Option<String>,
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<Collection>,
) -> Result<Json<ListResponse>, AppError> {
    let records = load_collection(&state, collection).await?;

    // Self-healing pass: earlier writers leaked timestamp duplicates, so
    // every read cleans and, when something was dropped, persists the repair.
    let (records, removed) = collection::dedupe_by_timestamp(records);
    if removed > 0 {
        persist_collection(&state, collection, &records).await?;
        info!(
            key = collection.key(),
            removed, "repaired duplicate timestamps on read"
        );
    }

    info!(key = collection.key(), count = records.len(), "retrieved collection");
    Ok(Json(ListResponse { collection: records }))
}

pub async fn append_handler(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<Collection>,
    body: Bytes,
) -> Result<Json<AppendResponse>, AppError> {
    let mut record = parse_candidate(&body)?;

    if record.kind == "image" {
        record.content = compress_content(record.content).await;
    }

    let size = record.content_size();
    let limit = if record.kind == "image" {
        IMAGE_CONTENT_LIMIT
    } else {
        TEXT_CONTENT_LIMIT
    };
    if size > limit {
        return Err(AppError::PayloadTooLarge { size, limit });
    }

    let mut records = load_collection(&state, collection).await?;

    // Assigned against the loaded collection so same-millisecond appends
    // never share a timestamp with a stored record.
    if record.timestamp.is_none() {
        record.timestamp = Some(collection::next_timestamp(&records, now_millis()));
    }

    if collection::is_duplicate(&records, &record) {
        info!(key = collection.key(), "duplicate record detected, not adding");
    } else {
        collection::insert_newest(&mut records, record, collection.retention_cap());
        persist_collection(&state, collection, &records).await?;
        info!(key = collection.key(), total = records.len(), "record added");
    }

    Ok(Json(AppendResponse {
        success: true,
        collection: records,
    }))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<Collection>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<DeleteResponse>, AppError> {
    let records = load_collection(&state, collection).await?;

    let (records, removed) = match params.action.as_deref() {
        Some("clear-large-images") => {
            collection::remove_large_images(records, LARGE_IMAGE_THRESHOLD)
        }
        Some("delete-by-timestamp") => {
            collection::remove_by_timestamp(records, parse_timestamp(params.timestamp)?)
        }
        // a bare timestamp param is a targeted delete too
        None if params.timestamp.is_some() => {
            collection::remove_by_timestamp(records, parse_timestamp(params.timestamp)?)
        }
        None | Some("clear-duplicates") => collection::dedupe_by_timestamp(records),
        Some(other) => return Err(AppError::UnknownAction(other.to_string())),
    };

    persist_collection(&state, collection, &records).await?;
    info!(key = collection.key(), removed, remaining = records.len(), "delete applied");

    Ok(Json(DeleteResponse {
        success: true,
        removed,
        remaining: records.len(),
        collection: records,
    }))
}

/// Plain (non-preflight) OPTIONS; preflights are answered by the CORS layer.
pub async fn options_handler() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

async fn load_collection(
    state: &AppState,
    collection: Collection,
) -> Result<Vec<Record>, AppError> {
    let raw = state.store.get(collection.key()).await?;
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

async fn persist_collection(
    state: &AppState,
    collection: Collection,
    records: &[Record],
) -> Result<(), AppError> {
    let json = serde_json::to_string(records)?;
    state.store.set(collection.key(), json).await?;
    Ok(())
}

/// Strict validation of a submitted record: the body must be a JSON object
/// and every required field a non-empty string. Reports all missing fields
/// at once.
fn parse_candidate(body: &Bytes) -> Result<Record, AppError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| AppError::MalformedPayload)?;

    let object = value.as_object().ok_or(AppError::MalformedPayload)?;

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .filter(|field| {
            !object
                .get(**field)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty())
        })
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(AppError::MissingFields(missing));
    }

    serde_json::from_value(value).map_err(|_| AppError::MalformedPayload)
}

/// The query parameter arrives as a string; normalize it to the stored
/// numeric type instead of comparing loosely.
fn parse_timestamp(param: Option<String>) -> Result<i64, AppError> {
    let raw = param.ok_or(AppError::MissingTimestamp)?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::InvalidTimestamp(raw))
}

async fn compress_content(content: String) -> String {
    let original = content.clone();
    let job = task::spawn_blocking(move || recompress_base64_image(&content));

    match timeout(COMPRESSION_TIMEOUT, job).await {
        Ok(Ok(Some(compressed))) => compressed,
        Ok(_) => {
            warn!("image recompression failed, keeping original content");
            original
        }
        Err(_) => {
            warn!("image recompression timed out, keeping original content");
            original
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
