use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::db::repositories::{
    ExecutionFilter, ExecutionRepository, ParameterRepository, QueryRepository,
};
use common::executor::ExecutionOutcome;
use common::models::{QueryExecution, ReportQuery};

const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Request to execute a report query
#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    /// Parameter values keyed by WHERE position
    #[serde(default)]
    pub values: HashMap<i32, String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub executed_by: Option<String>,
}

/// Request to run a query in test mode
#[derive(Debug, Deserialize)]
pub struct TestQueryRequest {
    /// Explicit test values; synthesized from defaults and types when absent
    pub values: Option<HashMap<i32, String>>,
    pub executed_by: Option<String>,
}

/// Query parameters for listing the audit trail
#[derive(Debug, Deserialize)]
pub struct ListExecutionsQuery {
    pub query_id: Option<Uuid>,
    pub success: Option<bool>,
    pub executed_by: Option<String>,
    pub limit: Option<i64>,
}

/// Query parameters for retention cleanup
#[derive(Debug, Deserialize)]
pub struct PurgeExecutionsQuery {
    pub older_than_days: i64,
}

async fn load_active_query(
    state: &AppState,
    id: Uuid,
) -> Result<ReportQuery, ErrorResponse> {
    let query = QueryRepository::new(state.db_pool.clone())
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, query_id = %id, "Failed to load query");
            ErrorResponse::new("database_error", "Failed to load query")
        })?
        .ok_or_else(|| ErrorResponse::new("not_found", format!("Query not found: {}", id)))?;

    if !query.active {
        return Err(ErrorResponse::new(
            "validation_error",
            format!("Query '{}' is inactive", query.name),
        ));
    }

    Ok(query)
}

/// Execute one page of a report query.
/// Failures surface inside the outcome rather than as HTTP errors; the
/// attempt is audit-logged either way.
#[tracing::instrument(skip(state, req), fields(query_id = %id))]
pub async fn execute_query(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExecuteQueryRequest>,
) -> Result<Json<SuccessResponse<ExecutionOutcome>>, ErrorResponse> {
    let query = load_active_query(&state, id).await?;

    let parameters = ParameterRepository::new(state.db_pool.clone())
        .find_by_query_id(id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, query_id = %id, "Failed to load parameters");
            ErrorResponse::new("database_error", "Failed to load parameters")
        })?;

    let outcome = state
        .executor
        .execute(
            &query,
            &parameters,
            &req.values,
            req.page.unwrap_or(1),
            req.page_size,
            req.executed_by.as_deref().unwrap_or("system"),
        )
        .await;

    Ok(Json(SuccessResponse::new(outcome)))
}

/// Run a query in test mode: first page, capped row count
#[tracing::instrument(skip(state, req), fields(query_id = %id))]
pub async fn test_query(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TestQueryRequest>,
) -> Result<Json<SuccessResponse<ExecutionOutcome>>, ErrorResponse> {
    let query = load_active_query(&state, id).await?;

    let parameters = ParameterRepository::new(state.db_pool.clone())
        .find_by_query_id(id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, query_id = %id, "Failed to load parameters");
            ErrorResponse::new("database_error", "Failed to load parameters")
        })?;

    let outcome = state
        .executor
        .execute_test(
            &query,
            &parameters,
            req.values,
            req.executed_by.as_deref().unwrap_or("system"),
        )
        .await;

    Ok(Json(SuccessResponse::new(outcome)))
}

/// List audit records with filters
#[tracing::instrument(skip(state))]
pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<SuccessResponse<Vec<QueryExecution>>>, ErrorResponse> {
    let filter = ExecutionFilter {
        query_id: query.query_id,
        success: query.success,
        executed_by: query.executed_by,
        limit: Some(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)),
    };

    let repo = ExecutionRepository::new(state.db_pool.clone());
    let executions = repo.find_with_filter(filter).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list executions");
        ErrorResponse::new("database_error", "Failed to retrieve executions")
    })?;

    tracing::info!(count = executions.len(), "Listed executions");
    Ok(Json(SuccessResponse::new(executions)))
}

/// Get one audit record by ID
#[tracing::instrument(skip(state))]
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<QueryExecution>>, ErrorResponse> {
    let repo = ExecutionRepository::new(state.db_pool.clone());

    let execution = repo.find_by_id(id).await.map_err(|e| {
        tracing::error!(error = %e, execution_id = %id, "Failed to get execution");
        ErrorResponse::new("database_error", "Failed to retrieve execution")
    })?;

    match execution {
        Some(exec) => Ok(Json(SuccessResponse::new(exec))),
        None => Err(ErrorResponse::new(
            "not_found",
            format!("Execution not found: {}", id),
        )),
    }
}

/// Delete audit records older than the given number of days
#[tracing::instrument(skip(state))]
pub async fn purge_executions(
    State(state): State<AppState>,
    Query(query): Query<PurgeExecutionsQuery>,
) -> Result<Json<SuccessResponse<u64>>, ErrorResponse> {
    if query.older_than_days <= 0 {
        return Err(ErrorResponse::new(
            "validation_error",
            "older_than_days must be positive",
        ));
    }

    let repo = ExecutionRepository::new(state.db_pool.clone());
    let deleted = repo
        .delete_older_than(query.older_than_days)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to purge executions");
            ErrorResponse::new("database_error", "Failed to purge executions")
        })?;

    tracing::info!(deleted, days = query.older_than_days, "Purged old executions");
    Ok(Json(SuccessResponse::new(deleted)))
}

/// List the recent audit records of one query
#[tracing::instrument(skip(state))]
pub async fn list_query_executions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<SuccessResponse<Vec<QueryExecution>>>, ErrorResponse> {
    let repo = ExecutionRepository::new(state.db_pool.clone());
    let executions = repo
        .find_by_query_id(id, query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, query_id = %id, "Failed to list executions");
            ErrorResponse::new("database_error", "Failed to retrieve executions")
        })?;

    Ok(Json(SuccessResponse::new(executions)))
}
