use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::db::repositories::{ParameterRepository, QueryRepository};
use common::errors::{DatabaseError, ValidationError};
use common::formatter;
use common::from_parser::{self, ParsedFrom};
use common::models::{ParameterType, QueryParameter, ReportQuery};
use common::validator::{self, ValidationReport};

/// Parameter definition as submitted by the authoring UI
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterPayload {
    pub internal_name: String,
    pub label: String,
    pub data_type: ParameterType,
    #[serde(default)]
    pub orden: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub required: bool,
    pub default_value: Option<String>,
    pub placeholder: Option<String>,
    pub where_position: i32,
}

fn default_true() -> bool {
    true
}

/// Request to create a new report query
#[derive(Debug, Deserialize)]
pub struct CreateQueryRequest {
    pub name: String,
    pub description: Option<String>,
    pub select_clause: String,
    pub from_clause: String,
    #[serde(default)]
    pub where_clause: String,
    pub created_by: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterPayload>,
}

/// Request to update an existing report query
#[derive(Debug, Deserialize)]
pub struct UpdateQueryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub select_clause: Option<String>,
    pub from_clause: Option<String>,
    pub where_clause: Option<String>,
    pub active: Option<bool>,
    pub parameters: Option<Vec<ParameterPayload>>,
}

/// Request to validate SQL fragments without saving
#[derive(Debug, Deserialize)]
pub struct ValidateQueryRequest {
    pub select_clause: String,
    pub from_clause: String,
    #[serde(default)]
    pub where_clause: String,
}

/// Validation result plus the parsed FROM structure for UI display
#[derive(Debug, Serialize)]
pub struct ValidateQueryResponse {
    #[serde(flatten)]
    pub report: ValidationReport,
    pub parsed_from: ParsedFrom,
}

/// Saved query together with the warnings raised at save time
#[derive(Debug, Serialize)]
pub struct SavedQueryResponse {
    pub id: Uuid,
    pub warnings: Vec<String>,
}

/// Full query detail: the definition and its parameters
#[derive(Debug, Serialize)]
pub struct QueryDetailResponse {
    #[serde(flatten)]
    pub query: ReportQuery,
    pub parameters: Vec<QueryParameter>,
    pub preview: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQueriesQuery {
    #[serde(default)]
    pub active_only: bool,
}

fn db_error(context: &str) -> impl Fn(DatabaseError) -> ErrorResponse + '_ {
    move |e| match e {
        DatabaseError::NotFound(msg) => ErrorResponse::new("not_found", msg),
        DatabaseError::DuplicateKey(msg) => ErrorResponse::new("conflict", msg),
        other => {
            tracing::error!(error = %other, "{}", context);
            ErrorResponse::new("database_error", context)
        }
    }
}

/// Check fragments and parameter payloads together, collecting all
/// problems into one report
fn check_definition(
    select_clause: &str,
    from_clause: &str,
    where_clause: &str,
    parameters: &[ParameterPayload],
) -> ValidationReport {
    let mut report = validator::validate_full_query(select_clause, from_clause, where_clause);

    for param in parameters {
        if param.internal_name.contains(char::is_whitespace) {
            report.valid = false;
            report.errors.push(format!(
                "Parameter '{}': {}",
                param.label,
                ValidationError::InternalNameWithWhitespace
            ));
        }

        if let Some(default) = param.default_value.as_deref() {
            if !default.is_empty() {
                if let Err(e) = formatter::validate_default(param.data_type, default) {
                    report.valid = false;
                    report
                        .errors
                        .push(format!("Parameter '{}': {}", param.label, e));
                }
            }
        }
    }

    // Every placeholder in WHERE needs a parameter row at that position
    let covered: Vec<i32> = parameters.iter().map(|p| p.where_position).collect();
    for position in &report.parameter_positions {
        if !covered.contains(position) {
            report.valid = false;
            report
                .errors
                .push(format!("WHERE: no parameter defined for position %{}", position));
        }
    }

    report
}

fn to_parameters(query_id: Uuid, payloads: &[ParameterPayload]) -> Vec<QueryParameter> {
    payloads
        .iter()
        .map(|p| QueryParameter {
            id: Uuid::new_v4(),
            query_id,
            internal_name: p.internal_name.clone(),
            label: p.label.clone(),
            data_type: p.data_type,
            orden: p.orden,
            visible: p.visible,
            required: p.required,
            default_value: p.default_value.clone(),
            placeholder: p.placeholder.clone(),
            where_position: p.where_position,
        })
        .collect()
}

/// Create a new report query with its parameters
#[tracing::instrument(skip(state, req), fields(query_name = %req.name))]
pub async fn create_query(
    State(state): State<AppState>,
    Json(req): Json<CreateQueryRequest>,
) -> Result<Json<SuccessResponse<SavedQueryResponse>>, ErrorResponse> {
    if req.name.trim().is_empty() {
        return Err(ErrorResponse::new(
            "validation_error",
            "The query name cannot be empty",
        ));
    }

    let report = check_definition(
        &req.select_clause,
        &req.from_clause,
        &req.where_clause,
        &req.parameters,
    );
    if !report.valid {
        return Err(ErrorResponse::new(
            "validation_error",
            "The query definition is not valid",
        )
        .with_details(serde_json::json!({ "errors": report.errors })));
    }

    let query = ReportQuery::new(
        req.name,
        req.description,
        req.select_clause,
        req.from_clause,
        req.where_clause,
        req.created_by,
    );

    let parameters = to_parameters(query.id, &req.parameters);
    QueryRepository::new(state.db_pool.clone())
        .create_with_parameters(&query, &parameters)
        .await
        .map_err(db_error("Failed to create query"))?;

    tracing::info!(query_id = %query.id, "Report query created");
    Ok(Json(SuccessResponse::new(SavedQueryResponse {
        id: query.id,
        warnings: report.warnings,
    })))
}

/// List report queries
#[tracing::instrument(skip(state))]
pub async fn list_queries(
    State(state): State<AppState>,
    Query(params): Query<ListQueriesQuery>,
) -> Result<Json<SuccessResponse<Vec<ReportQuery>>>, ErrorResponse> {
    let repo = QueryRepository::new(state.db_pool.clone());
    let queries = repo
        .find_all(params.active_only)
        .await
        .map_err(db_error("Failed to list queries"))?;

    tracing::info!(count = queries.len(), "Listed queries");
    Ok(Json(SuccessResponse::new(queries)))
}

/// Get one query with its parameters and assembled preview
#[tracing::instrument(skip(state))]
pub async fn get_query(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<QueryDetailResponse>>, ErrorResponse> {
    let query = QueryRepository::new(state.db_pool.clone())
        .find_by_id(id)
        .await
        .map_err(db_error("Failed to get query"))?
        .ok_or_else(|| ErrorResponse::new("not_found", format!("Query not found: {}", id)))?;

    let parameters = ParameterRepository::new(state.db_pool.clone())
        .find_by_query_id(id)
        .await
        .map_err(db_error("Failed to load parameters"))?;

    let preview = query.full_preview();
    Ok(Json(SuccessResponse::new(QueryDetailResponse {
        query,
        parameters,
        preview,
    })))
}

/// Update an existing query. Fragments are revalidated as a whole against
/// the merged definition.
#[tracing::instrument(skip(state, req))]
pub async fn update_query(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateQueryRequest>,
) -> Result<Json<SuccessResponse<SavedQueryResponse>>, ErrorResponse> {
    let query_repo = QueryRepository::new(state.db_pool.clone());
    let param_repo = ParameterRepository::new(state.db_pool.clone());

    let mut query = query_repo
        .find_by_id(id)
        .await
        .map_err(db_error("Failed to get query"))?
        .ok_or_else(|| ErrorResponse::new("not_found", format!("Query not found: {}", id)))?;

    if let Some(name) = req.name {
        query.name = name;
    }
    if let Some(description) = req.description {
        query.description = Some(description);
    }
    if let Some(select_clause) = req.select_clause {
        query.select_clause = select_clause;
    }
    if let Some(from_clause) = req.from_clause {
        query.from_clause = from_clause;
    }
    if let Some(where_clause) = req.where_clause {
        query.where_clause = where_clause;
    }
    if let Some(active) = req.active {
        query.active = active;
    }
    query.updated_at = Utc::now();

    let existing_parameters;
    let parameters: &[ParameterPayload] = match &req.parameters {
        Some(payloads) => payloads,
        None => {
            existing_parameters = param_repo
                .find_by_query_id(id)
                .await
                .map_err(db_error("Failed to load parameters"))?
                .into_iter()
                .map(|p| ParameterPayload {
                    internal_name: p.internal_name,
                    label: p.label,
                    data_type: p.data_type,
                    orden: p.orden,
                    visible: p.visible,
                    required: p.required,
                    default_value: p.default_value,
                    placeholder: p.placeholder,
                    where_position: p.where_position,
                })
                .collect::<Vec<_>>();
            &existing_parameters
        }
    };

    let report = check_definition(
        &query.select_clause,
        &query.from_clause,
        &query.where_clause,
        parameters,
    );
    if !report.valid {
        return Err(ErrorResponse::new(
            "validation_error",
            "The query definition is not valid",
        )
        .with_details(serde_json::json!({ "errors": report.errors })));
    }

    if let Some(payloads) = &req.parameters {
        query_repo
            .update_with_parameters(&query, &to_parameters(id, payloads))
            .await
            .map_err(db_error("Failed to update query"))?;
    } else {
        // Placeholders may have been removed from the template; drop the
        // parameter rows that no longer have a position
        query_repo
            .update_with_pruning(&query, &report.parameter_positions)
            .await
            .map_err(db_error("Failed to update query"))?;
    }

    tracing::info!(query_id = %id, "Report query updated");
    Ok(Json(SuccessResponse::new(SavedQueryResponse {
        id,
        warnings: report.warnings,
    })))
}

/// Delete a query with its parameters and audit records
#[tracing::instrument(skip(state))]
pub async fn delete_query(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<Uuid>>, ErrorResponse> {
    QueryRepository::new(state.db_pool.clone())
        .delete(id)
        .await
        .map_err(db_error("Failed to delete query"))?;

    tracing::info!(query_id = %id, "Report query deleted");
    Ok(Json(SuccessResponse::new(id)))
}

/// Validate SQL fragments without saving anything
#[tracing::instrument(skip(req))]
pub async fn validate_query(
    Json(req): Json<ValidateQueryRequest>,
) -> Json<SuccessResponse<ValidateQueryResponse>> {
    let report =
        validator::validate_full_query(&req.select_clause, &req.from_clause, &req.where_clause);
    let parsed_from = from_parser::parse_from_clause(&req.from_clause);

    Json(SuccessResponse::new(ValidateQueryResponse {
        report,
        parsed_from,
    }))
}

/// Replace the parameter set of a query
#[tracing::instrument(skip(state, payloads))]
pub async fn replace_parameters(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payloads): Json<Vec<ParameterPayload>>,
) -> Result<Json<SuccessResponse<SavedQueryResponse>>, ErrorResponse> {
    let query = QueryRepository::new(state.db_pool.clone())
        .find_by_id(id)
        .await
        .map_err(db_error("Failed to get query"))?
        .ok_or_else(|| ErrorResponse::new("not_found", format!("Query not found: {}", id)))?;

    let report = check_definition(
        &query.select_clause,
        &query.from_clause,
        &query.where_clause,
        &payloads,
    );
    if !report.valid {
        return Err(ErrorResponse::new(
            "validation_error",
            "The parameter set is not valid",
        )
        .with_details(serde_json::json!({ "errors": report.errors })));
    }

    ParameterRepository::new(state.db_pool.clone())
        .replace_for_query(id, &to_parameters(id, &payloads))
        .await
        .map_err(db_error("Failed to save parameters"))?;

    tracing::info!(query_id = %id, count = payloads.len(), "Parameters replaced");
    Ok(Json(SuccessResponse::new(SavedQueryResponse {
        id,
        warnings: report.warnings,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(position: i32, data_type: ParameterType) -> ParameterPayload {
        ParameterPayload {
            internal_name: format!("param_{}", position),
            label: format!("Param {}", position),
            data_type,
            orden: position,
            visible: true,
            required: false,
            default_value: None,
            placeholder: None,
            where_position: position,
        }
    }

    #[test]
    fn test_check_definition_accepts_complete_definition() {
        let report = check_definition(
            "a.Nombre AS Producto",
            "FROM dbo.Articulos a",
            "WHERE a.Estado = %1",
            &[payload(1, ParameterType::Text)],
        );
        assert!(report.valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_check_definition_rejects_uncovered_placeholder() {
        let report = check_definition(
            "a.Nombre",
            "FROM dbo.Articulos a",
            "WHERE a.Estado = %1 AND a.Cantidad > %2",
            &[payload(1, ParameterType::Text)],
        );
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("%2")));
    }

    #[test]
    fn test_check_definition_rejects_whitespace_internal_name() {
        let mut bad = payload(1, ParameterType::Text);
        bad.internal_name = "estado articulo".to_string();

        let report = check_definition(
            "a.Nombre",
            "FROM dbo.Articulos a",
            "WHERE a.Estado = %1",
            &[bad],
        );
        assert!(!report.valid);
    }

    #[test]
    fn test_check_definition_rejects_bad_default_value() {
        let mut bad = payload(1, ParameterType::Integer);
        bad.default_value = Some("many".to_string());

        let report = check_definition(
            "a.Nombre",
            "FROM dbo.Articulos a",
            "WHERE a.Cantidad > %1",
            &[bad],
        );
        assert!(!report.valid);
    }
}
