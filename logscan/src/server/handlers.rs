//! HTTP route handlers.
//!
//! Thin adapters between the wire and the ingestion/query services: decode
//! the multipart upload or query parameters, call the service, and wrap the
//! result in the response envelope.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::error::ApiError;
use super::metrics::Metrics;
use crate::config::AppConfig;
use crate::error::Error;
use crate::ingest::IngestPipeline;
use crate::query::export::{self, ExportFormat, ExportRequest};
use crate::query::{LogQueryRequest, QueryService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub query: Arc<QueryService>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<AppConfig>,
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    #[serde(with = "logstore::entry::ts_millis")]
    pub timestamp: NaiveDateTime,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data,
            timestamp: crate::parser::timestamp::now(),
        })
    }
}

/// Response body for an accepted upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: String,
    pub status_url: String,
    pub result_url: String,
    pub file_name: String,
    pub file_size: u64,
}

/// Handle POST /logs/upload (multipart: `logfile`, `timestampFormat`).
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut spooled: Option<(std::path::PathBuf, String, u64)> = None;
    let mut timestamp_format: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("malformed multipart body: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "logfile" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| Error::InvalidInput("logfile field has no filename".into()))?;

                if !state.config.file.is_allowed_extension(&file_name) {
                    return Err(Error::InvalidInput(format!(
                        "Invalid file type. Allowed types: {}",
                        state.config.file.allowed_types.join(", ")
                    ))
                    .into());
                }

                let (path, size) = spool_to_temp_file(&state, &mut field).await?;
                spooled = Some((path, file_name, size));
            }
            "timestampFormat" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("bad timestampFormat field: {}", e)))?;
                if !value.trim().is_empty() {
                    timestamp_format = Some(value);
                }
            }
            _ => {}
        }
    }

    let Some((file_path, file_name, file_size)) = spooled else {
        return Err(Error::InvalidInput("No file uploaded or file is empty".into()).into());
    };
    if file_size == 0 {
        let _ = tokio::fs::remove_file(&file_path).await;
        return Err(Error::InvalidInput("No file uploaded or file is empty".into()).into());
    }

    info!(file = %file_name, size = file_size, "received file upload");

    let job_id = state
        .pipeline
        .submit(crate::ingest::SubmitJob {
            file_path,
            file_name: file_name.clone(),
            file_size,
            timestamp_format,
        })
        .await?;

    state.metrics.uploads_accepted_total.inc();

    let body = ApiResponse::success(
        "File uploaded successfully and queued for processing",
        UploadResponse {
            status_url: format!("/logs/status/{}", job_id),
            result_url: format!("/logs/result/{}", job_id),
            job_id,
            file_name,
            file_size,
        },
    );
    Ok((StatusCode::ACCEPTED, body).into_response())
}

/// Streams one multipart field into a temp file, enforcing the size cap.
async fn spool_to_temp_file(
    state: &AppState,
    field: &mut axum::extract::multipart::Field<'_>,
) -> Result<(std::path::PathBuf, u64), ApiError> {
    let temp_dir = state
        .config
        .file
        .temp_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().display().to_string());
    tokio::fs::create_dir_all(&temp_dir)
        .await
        .map_err(|e| Error::Internal(format!("cannot create temp dir: {}", e)))?;

    let temp = tempfile::Builder::new()
        .prefix("logscan-")
        .tempfile_in(&temp_dir)
        .map_err(|e| Error::Internal(format!("cannot create temp file: {}", e)))?;
    let (file, path) = temp
        .keep()
        .map_err(|e| Error::Internal(format!("cannot persist temp file: {}", e)))?;

    let mut file = tokio::fs::File::from_std(file);
    let mut written: u64 = 0;
    let max = state.config.file.max_size;

    loop {
        let chunk: Option<Bytes> = field
            .chunk()
            .await
            .map_err(|e| Error::InvalidInput(format!("upload interrupted: {}", e)))?;
        let Some(chunk) = chunk else {
            break;
        };
        written += chunk.len() as u64;
        if written > max {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(Error::FileTooLarge {
                max,
                actual: written,
            }
            .into());
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::Internal(format!("cannot write temp file: {}", e)))?;
    }
    file.flush()
        .await
        .map_err(|e| Error::Internal(format!("cannot flush temp file: {}", e)))?;

    Ok((path, written))
}

/// Handle GET /logs/status/{jobId}.
pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.pipeline.get_status(&job_id).await?;
    Ok(ApiResponse::success("Job status retrieved successfully", status))
}

/// Handle GET /logs/result/{jobId}.
pub async fn result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.pipeline.get_result(&job_id).await?;
    Ok(ApiResponse::success(
        "Analysis result retrieved successfully",
        result,
    ))
}

/// Handle POST /logs/search.
pub async fn search_post(
    State(state): State<AppState>,
    Json(request): Json<LogQueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.searches_total.inc();
    let response = state.query.search(&request).await?;
    Ok(ApiResponse::success("Search completed successfully", response))
}

/// Flat query-parameter form of a search request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub job_id: String,
    pub search_text: Option<String>,
    /// Comma-separated list.
    pub levels: Option<String>,
    pub file_name: Option<String>,
    pub logger: Option<String>,
    pub thread: Option<String>,
    pub has_error: Option<bool>,
    pub has_stack_trace: Option<bool>,
    pub sort_by: String,
    pub sort_direction: String,
    pub page: i64,
    pub size: i64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            job_id: String::new(),
            search_text: None,
            levels: None,
            file_name: None,
            logger: None,
            thread: None,
            has_error: None,
            has_stack_trace: None,
            sort_by: "timestamp".to_string(),
            sort_direction: "desc".to_string(),
            page: 0,
            size: 50,
        }
    }
}

impl From<SearchParams> for LogQueryRequest {
    fn from(params: SearchParams) -> Self {
        let levels = params.levels.map(|raw| {
            raw.split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
        });
        LogQueryRequest {
            job_id: params.job_id,
            search_text: params.search_text,
            levels,
            file_name: params.file_name,
            logger: params.logger,
            thread: params.thread,
            has_error: params.has_error,
            has_stack_trace: params.has_stack_trace,
            sort_by: params.sort_by,
            sort_direction: params.sort_direction,
            page: params.page,
            size: params.size,
            ..LogQueryRequest::default()
        }
    }
}

/// Handle GET /logs/search.
pub async fn search_get(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.searches_total.inc();
    let request = LogQueryRequest::from(params);
    let response = state.query.search(&request).await?;
    Ok(ApiResponse::success("Search completed successfully", response))
}

/// Handle GET /logs/job/{jobId}/summary.
pub async fn summary(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.query.job_summary(&job_id).await?;
    Ok(ApiResponse::success(
        "Job summary retrieved successfully",
        summary,
    ))
}

/// Handle GET /logs/job/{jobId}/levels.
pub async fn levels(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let distribution = state.query.level_distribution(&job_id).await?;
    Ok(ApiResponse::success(
        "Level distribution retrieved successfully",
        distribution,
    ))
}

#[derive(Debug, Deserialize)]
pub struct TimelineParams {
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_interval() -> String {
    "1h".to_string()
}

/// Handle GET /logs/job/{jobId}/timeline.
pub async fn timeline(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<TimelineParams>,
) -> Result<impl IntoResponse, ApiError> {
    let timeline = state.query.timeline(&job_id, &params.interval).await?;
    Ok(ApiResponse::success(
        "Timeline data retrieved successfully",
        timeline,
    ))
}

/// Handle GET /logs/job/{jobId}/fields.
pub async fn fields(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = state.query.available_fields(&job_id).await?;
    Ok(ApiResponse::success(
        "Available fields retrieved successfully",
        fields,
    ))
}

#[derive(Debug, Deserialize)]
pub struct FieldValuesParams {
    #[serde(default = "default_field_limit")]
    pub limit: usize,
}

fn default_field_limit() -> usize {
    100
}

/// Handle GET /logs/job/{jobId}/fields/{fieldName}.
pub async fn field_values(
    State(state): State<AppState>,
    Path((job_id, field_name)): Path<(String, String)>,
    Query(params): Query<FieldValuesParams>,
) -> Result<impl IntoResponse, ApiError> {
    let values = state
        .query
        .unique_field_values(&job_id, &field_name, params.limit)
        .await?;
    Ok(ApiResponse::success(
        "Field values retrieved successfully",
        values,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ContextParams {
    #[serde(default = "default_context_window")]
    pub before: u64,
    #[serde(default = "default_context_window")]
    pub after: u64,
}

fn default_context_window() -> u64 {
    5
}

/// Handle GET /logs/job/{jobId}/context/{lineNumber}.
pub async fn context(
    State(state): State<AppState>,
    Path((job_id, line_number)): Path<(String, u64)>,
    Query(params): Query<ContextParams>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .query
        .context_lines(&job_id, line_number, params.before, params.after)
        .await?;
    Ok(ApiResponse::success(
        "Context lines retrieved successfully",
        response,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    #[serde(default = "default_export_format")]
    pub format: String,
    #[serde(rename = "maxRecords")]
    pub max_records: Option<i64>,
}

fn default_export_format() -> String {
    "csv".to_string()
}

/// Handle POST /logs/job/{jobId}/export.
pub async fn export_post(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<ExportParams>,
    body: Option<Json<ExportRequest>>,
) -> Result<Response, ApiError> {
    let request = match body {
        Some(Json(request)) => request,
        None => ExportRequest {
            format: ExportFormat::parse(&params.format)?,
            ..ExportRequest::default()
        },
    };
    render_export(&state, &job_id, request).await
}

/// Handle GET /logs/job/{jobId}/export.
pub async fn export_get(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let request = ExportRequest {
        format: ExportFormat::parse(&params.format)?,
        max_records: params.max_records.unwrap_or(export::DEFAULT_MAX_RECORDS),
        ..ExportRequest::default()
    };
    render_export(&state, &job_id, request).await
}

async fn render_export(
    state: &AppState,
    job_id: &str,
    request: ExportRequest,
) -> Result<Response, ApiError> {
    let payload = export::export(&state.query, job_id, &request).await?;
    state.metrics.exports_total.inc();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(payload.content_type),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", payload.file_name))
            .map_err(|e| Error::Internal(e.to_string()))?,
    );
    Ok((StatusCode::OK, headers, payload.body).into_response())
}

/// Handle GET /metrics.
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

/// Handle GET /-/healthy.
pub async fn healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Handle GET /-/ready.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    // A search against an empty partition verifies the store responds.
    let probe = logstore::SearchPlan::for_job("readiness-probe");
    match state.query.store_probe(&probe).await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "Not Ready"),
    }
}
