//! HTTP surface: document reads, structural edits, and the WebSocket route.
//!
//! Errors are returned as `{"error": {"code": ..., "message": ...}}` with the
//! matching HTTP status.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use folio_kernel::{DocumentView, StoreError, VersionView};
use folio_types::{DocumentId, DocumentMeta, InsertKind, VersionId, VersionMeta};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::constants::{DEFAULT_AUTHOR, WEBSOCKET_PATH};
use crate::error::DispatchError;
use crate::hub::Hub;
use crate::locks::LockInfo;
use crate::ws::ws_handler;

type SharedHub = Arc<Hub>;
type ApiResult<T> = Result<T, ApiError>;

/// Build the application router over `hub`.
pub fn router(hub: SharedHub) -> Router {
    Router::new()
        .route("/api/documents", get(list_documents))
        .route("/api/documents/create", post(create_document))
        .route("/api/documents/:id", get(get_document).put(rename_document))
        .route("/api/documents/:id/save_template", post(save_template))
        .route("/api/documents/:id/blocks", post(add_block))
        .route("/api/documents/:id/blocks/:block_id", delete(delete_block))
        .route("/api/documents/:id/tables/:table_id/rows", post(add_table_row))
        .route("/api/documents/:id/tables/:table_id/content", get(table_content))
        .route("/api/documents/:id/revert", post(revert))
        .route("/api/versions/:id", get(list_versions))
        .route("/api/versions/:id/:version", get(get_version))
        .route("/api/locks", get(list_locks))
        .route("/api/templates", get(list_templates))
        .route(WEBSOCKET_PATH, get(ws_handler))
        .with_state(hub)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError(DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({ "error": { "code": code, "message": self.0.to_string() } });
        (status, Json(body)).into_response()
    }
}

fn author(changed_by: Option<String>) -> String {
    changed_by
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_AUTHOR.to_string())
}

// ============================================================================
// Documents
// ============================================================================

async fn list_documents(State(hub): State<SharedHub>) -> ApiResult<Json<Vec<DocumentMeta>>> {
    Ok(Json(hub.store().list_documents()?))
}

#[derive(Debug, Deserialize)]
struct CreateDocument {
    title: String,
    template_name: String,
    #[serde(default)]
    changed_by: Option<String>,
}

async fn create_document(
    State(hub): State<SharedHub>,
    Json(req): Json<CreateDocument>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (document, version) =
        hub.store()
            .create_from_template(&req.title, &req.template_name, &author(req.changed_by))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "document": document, "version": version })),
    ))
}

async fn get_document(
    State(hub): State<SharedHub>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DocumentView>> {
    Ok(Json(hub.store().document(DocumentId::new(id))?))
}

#[derive(Debug, Deserialize)]
struct RenameDocument {
    title: String,
}

async fn rename_document(
    State(hub): State<SharedHub>,
    Path(id): Path<i64>,
    Json(req): Json<RenameDocument>,
) -> ApiResult<StatusCode> {
    hub.store().rename_document(DocumentId::new(id), &req.title)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SaveTemplate {
    template_name: String,
}

async fn save_template(
    State(hub): State<SharedHub>,
    Path(id): Path<i64>,
    Json(req): Json<SaveTemplate>,
) -> ApiResult<Json<Value>> {
    let name = hub
        .store()
        .save_as_template(DocumentId::new(id), &req.template_name)?;
    Ok(Json(json!({ "template_name": name })))
}

// ============================================================================
// Structural edits
// ============================================================================

#[derive(Debug, Deserialize)]
struct AddBlock {
    block_type: String,
    #[serde(default)]
    after_block_id: Option<String>,
    #[serde(default)]
    changed_by: Option<String>,
}

async fn add_block(
    State(hub): State<SharedHub>,
    Path(id): Path<i64>,
    Json(req): Json<AddBlock>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let kind = InsertKind::from_str(&req.block_type).ok_or_else(|| {
        DispatchError::validation(format!("unsupported block type: {}", req.block_type))
    })?;
    let insertion = hub
        .add_block(
            DocumentId::new(id),
            kind,
            req.after_block_id.as_deref(),
            &author(req.changed_by),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "version": insertion.version, "blocks": insertion.added })),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct Author {
    #[serde(default)]
    changed_by: Option<String>,
}

async fn delete_block(
    State(hub): State<SharedHub>,
    Path((id, block_id)): Path<(i64, String)>,
    Query(who): Query<Author>,
) -> ApiResult<Json<Value>> {
    let removal = hub
        .delete_block(DocumentId::new(id), &block_id, &author(who.changed_by))
        .await?;
    Ok(Json(json!({ "version": removal.version, "removed": removal.removed })))
}

#[derive(Debug, Deserialize)]
struct AddRow {
    #[serde(default)]
    after_row_index: Option<u32>,
    #[serde(default)]
    changed_by: Option<String>,
}

async fn add_table_row(
    State(hub): State<SharedHub>,
    Path((id, table_id)): Path<(i64, String)>,
    Json(req): Json<AddRow>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let insertion = hub
        .add_table_row(
            DocumentId::new(id),
            &table_id,
            req.after_row_index,
            &author(req.changed_by),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "version": insertion.version,
            "row_index": insertion.row_index,
            "cells": insertion.cells,
        })),
    ))
}

async fn table_content(
    State(hub): State<SharedHub>,
    Path((id, table_id)): Path<(i64, String)>,
) -> ApiResult<Json<Value>> {
    let rows = hub.store().table_content(DocumentId::new(id), &table_id)?;
    Ok(Json(json!({ "table_id": table_id, "rows": rows })))
}

#[derive(Debug, Deserialize)]
struct Revert {
    version_id: VersionId,
    #[serde(default)]
    changed_by: Option<String>,
}

async fn revert(
    State(hub): State<SharedHub>,
    Path(id): Path<i64>,
    Json(req): Json<Revert>,
) -> ApiResult<Json<VersionMeta>> {
    let version = hub
        .revert(DocumentId::new(id), req.version_id, &author(req.changed_by))
        .await?;
    Ok(Json(version))
}

// ============================================================================
// History, locks, templates
// ============================================================================

async fn list_versions(
    State(hub): State<SharedHub>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<VersionMeta>>> {
    Ok(Json(hub.store().versions(DocumentId::new(id))?))
}

async fn get_version(
    State(hub): State<SharedHub>,
    Path((id, version)): Path<(i64, i64)>,
) -> ApiResult<Json<VersionView>> {
    Ok(Json(
        hub.store()
            .version(DocumentId::new(id), VersionId::new(version))?,
    ))
}

#[derive(Debug, Deserialize)]
struct LockQuery {
    document_id: String,
}

async fn list_locks(
    State(hub): State<SharedHub>,
    Query(query): Query<LockQuery>,
) -> ApiResult<Json<Vec<LockInfo>>> {
    let doc: DocumentId = query.document_id.parse().map_err(|_| {
        DispatchError::validation(format!("invalid document_id: {:?}", query.document_id))
    })?;
    Ok(Json(hub.locks(doc).await))
}

async fn list_templates(State(hub): State<SharedHub>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(hub.store().list_templates()?))
}
