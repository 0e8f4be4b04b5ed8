use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use common::db::repositories::{ParameterRepository, QueryRepository};
use common::export::{self, ExportFormat};
use common::telemetry;

/// Request to export the full result set of a query
#[derive(Debug, Deserialize)]
pub struct ExportQueryRequest {
    pub format: String,
    #[serde(default)]
    pub values: HashMap<i32, String>,
    pub executed_by: Option<String>,
}

fn parse_format(format: &str) -> Result<ExportFormat, ErrorResponse> {
    match format.to_lowercase().as_str() {
        "xlsx" => Ok(ExportFormat::Xlsx),
        "csv" => Ok(ExportFormat::Csv),
        other => Err(ErrorResponse::new(
            "validation_error",
            format!("Unsupported export format: {}", other),
        )),
    }
}

/// Execute a query with the configured row cap and stream the result back
/// as a downloadable file
#[tracing::instrument(skip(state, req), fields(query_id = %id, format = %req.format))]
pub async fn export_query(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExportQueryRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let format = parse_format(&req.format)?;

    let query = QueryRepository::new(state.db_pool.clone())
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, query_id = %id, "Failed to load query");
            ErrorResponse::new("database_error", "Failed to load query")
        })?
        .ok_or_else(|| ErrorResponse::new("not_found", format!("Query not found: {}", id)))?;

    let parameters = ParameterRepository::new(state.db_pool.clone())
        .find_by_query_id(id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, query_id = %id, "Failed to load parameters");
            ErrorResponse::new("database_error", "Failed to load parameters")
        })?;

    let outcome = state
        .executor
        .execute_for_export(
            &query,
            &parameters,
            &req.values,
            req.executed_by.as_deref().unwrap_or("system"),
        )
        .await;

    let file = export::export_outcome(&query.name, &outcome, format).map_err(|e| {
        tracing::error!(error = %e, query_id = %id, "Export failed");
        ErrorResponse::new("export_error", e.to_string())
    })?;

    telemetry::record_export(format.extension());
    tracing::info!(
        query_id = %id,
        filename = %file.filename,
        rows = outcome.total_rows,
        "Export generated"
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    Ok((headers, file.bytes))
}
