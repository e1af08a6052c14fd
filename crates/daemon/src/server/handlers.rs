//! Route handlers.
//!
//! Each handler resolves its root and path through the registry, calls one
//! file service and maps the result to a response body.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::{
    DeleteRequest, HealthResponse, ListQuery, ListResponse, MkdirRequest, OkResponse, PathQuery,
    ReadResponse, RenameRequest, RootsResponse, UploadResponse, WriteRequest,
};
use tracing::debug;

use super::error::ApiError;
use super::AppState;
use crate::files::{self, UploadSession};

type ApiResult<T> = Result<T, ApiError>;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        roots: state.registry.len(),
    })
}

pub async fn roots(State(state): State<Arc<AppState>>) -> Json<RootsResponse> {
    Json(RootsResponse::new(
        state.registry.roots().map(|root| root.info()).collect(),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<ListResponse>> {
    let Query(query) = query?;
    let dir = state
        .registry
        .resolve_path(query.root.as_deref(), query.path.as_deref().unwrap_or(""))?;

    let entries = files::list_directory(&dir).await?;

    Ok(Json(ListResponse::new(
        dir.root.id.clone(),
        dir.relative_path.clone(),
        entries.iter().map(|e| e.to_protocol()).collect(),
    )))
}

pub async fn read(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<Json<ReadResponse>> {
    let Query(query) = query?;
    let file = state
        .registry
        .resolve_path(query.root.as_deref(), &query.path)?;

    let preview = files::read_preview(&file, state.preview_max_bytes).await?;
    Ok(Json(preview.to_protocol()))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let target = state
        .registry
        .resolve_path(query.root.as_deref(), &query.path)?;

    let download =
        files::open_download(&target, &state.archiver, state.shutdown.child_token()).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(download.mime));
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(&download.file_name),
    );
    if let Some(size) = download.size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }

    debug!(root = %target.root.id, path = %target.relative_path, file_name = %download.file_name, "Starting download");

    Ok((headers, Body::from_stream(download.into_stream())).into_response())
}

pub async fn mkdir(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MkdirRequest>, JsonRejection>,
) -> ApiResult<Json<OkResponse>> {
    let Json(request) = body?;
    let dir = state
        .registry
        .resolve_path(request.root.as_deref(), &request.path)?;

    files::create_directory(&dir).await?;
    Ok(Json(OkResponse::default()))
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart?;
    let mut session = UploadSession::new(&state.registry, state.max_part_bytes);

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("dir" | "directory") => session.set_dir(field.text().await?),
            Some("root") => session.set_root(field.text().await?),
            Some("file") => {
                let file_name = field.file_name().map(str::to_owned);
                session.receive_file(file_name.as_deref(), field).await;
            }
            other => debug!(field = ?other, "Ignoring unknown multipart field"),
        }
    }

    Ok(Json(UploadResponse::new(session.finish())))
}

pub async fn write(
    State(state): State<Arc<AppState>>,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> ApiResult<Json<OkResponse>> {
    let Json(request) = body?;
    let file = state
        .registry
        .resolve_path(request.root.as_deref(), &request.path)?;

    files::write_file(&file, &request.content, request.encoding).await?;
    Ok(Json(OkResponse::default()))
}

pub async fn rename(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult<Json<OkResponse>> {
    let Json(request) = body?;
    let source = state
        .registry
        .resolve_path(request.root.as_deref(), &request.path)?;
    let destination_root = request
        .new_root
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(source.root.id.as_str());
    let destination = state
        .registry
        .resolve_path(Some(destination_root), &request.new_path)?;

    files::rename(&source, &destination).await?;
    Ok(Json(OkResponse::default()))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Json<OkResponse>> {
    let Json(request) = body?;
    let target = state
        .registry
        .resolve_path(request.root.as_deref(), &request.path)?;

    files::delete(&target).await?;
    Ok(Json(OkResponse::default()))
}

/// `attachment; filename="..."` with quotes and control characters replaced.
fn content_disposition(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' => '\'',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    HeaderValue::from_bytes(format!("attachment; filename=\"{}\"", safe).as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
