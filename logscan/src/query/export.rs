//! Export rendering.
//!
//! Compiles the caller's filters (capped at a record ceiling), fetches the
//! matching entries, and renders them as CSV, a pretty-printed JSON array,
//! or NDJSON. Field values are resolved through the document's accessor
//! table; nulls and unknown names serialize as empty strings.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::request::LogQueryRequest;
use super::service::QueryService;
use crate::error::{Error, Result};

/// Default export size.
pub const DEFAULT_MAX_RECORDS: i64 = 10_000;

/// Hard ceiling on export size.
pub const MAX_EXPORT_RECORDS: i64 = 100_000;

/// Default CSV column set.
pub const DEFAULT_EXPORT_FIELDS: &[&str] = &[
    "timestamp",
    "level",
    "logger",
    "thread",
    "message",
    "lineNumber",
    "fileName",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Csv,
    Json,
    Ndjson,
}

impl ExportFormat {
    /// Parses the wire form case-insensitively.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_uppercase().as_str() {
            "CSV" => Ok(Self::Csv),
            "JSON" => Ok(Self::Json),
            "NDJSON" => Ok(Self::Ndjson),
            other => Err(Error::InvalidInput(format!(
                "invalid export format: '{}'",
                other
            ))),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Ndjson => "application/x-ndjson",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Ndjson => "ndjson",
        }
    }
}

/// A bulk download request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportRequest {
    /// Optional filters; defaults to the whole job.
    pub query: Option<LogQueryRequest>,
    pub format: ExportFormat,
    /// Columns for CSV output.
    pub fields: Option<Vec<String>>,
    pub max_records: i64,
    pub include_headers: bool,
    pub delimiter: String,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            query: None,
            format: ExportFormat::Csv,
            fields: None,
            max_records: DEFAULT_MAX_RECORDS,
            include_headers: true,
            delimiter: ",".to_string(),
        }
    }
}

impl ExportRequest {
    pub fn effective_fields(&self) -> Vec<String> {
        match &self.fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => DEFAULT_EXPORT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// A rendered export ready for download.
#[derive(Debug, Clone)]
pub struct ExportPayload {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}

/// Renders an export for one job.
pub async fn export(
    service: &QueryService,
    job_id: &str,
    request: &ExportRequest,
) -> Result<ExportPayload> {
    if request.max_records < 1 || request.max_records > MAX_EXPORT_RECORDS {
        return Err(Error::InvalidInput(format!(
            "maxRecords must be between 1 and {}",
            MAX_EXPORT_RECORDS
        )));
    }

    info!(job_id, format = ?request.format, "exporting logs");

    let mut query = request
        .query
        .clone()
        .unwrap_or_else(|| LogQueryRequest::for_job(job_id));
    query.job_id = job_id.to_string();
    query.page = 0;
    query.size = request.max_records.min(crate::query::builder::MAX_PAGE_SIZE);
    query.include_summary = false;
    query.highlight_matches = false;

    // Page through the store up to the record cap.
    let mut entries = Vec::new();
    loop {
        let (mut page, total) = service.search_entries(&query).await?;
        let got = page.len();
        entries.append(&mut page);
        if entries.len() as i64 >= request.max_records
            || entries.len() as u64 >= total
            || got == 0
        {
            break;
        }
        query.page += 1;
    }
    entries.truncate(request.max_records as usize);

    let body = match request.format {
        ExportFormat::Csv => render_csv(&entries, request).into_bytes(),
        ExportFormat::Json => serde_json::to_vec_pretty(&entries)
            .map_err(|e| Error::Internal(format!("JSON export failed: {}", e)))?,
        ExportFormat::Ndjson => render_ndjson(&entries)?,
    };

    Ok(ExportPayload {
        body,
        content_type: request.format.content_type(),
        file_name: format!("logs-{}.{}", job_id, request.format.extension()),
    })
}

fn render_csv(entries: &[logstore::LogEntry], request: &ExportRequest) -> String {
    let delimiter = request.delimiter.chars().next().unwrap_or(',');
    let fields = request.effective_fields();
    let mut out = String::new();

    if request.include_headers {
        let header: Vec<String> = fields.iter().map(|f| csv_escape(f, delimiter)).collect();
        out.push_str(&header.join(&delimiter.to_string()));
        out.push('\n');
    }

    for entry in entries {
        let row: Vec<String> = fields
            .iter()
            .map(|field| csv_escape(&entry.render_field(field), delimiter))
            .collect();
        out.push_str(&row.join(&delimiter.to_string()));
        out.push('\n');
    }

    out
}

fn render_ndjson(entries: &[logstore::LogEntry]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for entry in entries {
        let line = serde_json::to_vec(entry)
            .map_err(|e| Error::Internal(format!("NDJSON export failed: {}", e)))?;
        out.extend_from_slice(&line);
        out.push(b'\n');
    }
    Ok(out)
}

/// Quotes a value when it contains the delimiter, a quote, or a newline;
/// embedded quotes double.
fn csv_escape(value: &str, delimiter: char) -> String {
    if value.contains(delimiter) || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
