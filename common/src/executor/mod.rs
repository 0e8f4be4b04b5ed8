// Execution orchestration for dynamic report queries
//
// The orchestrator validates supplied parameters, assembles the SQL,
// fetches one page of rows, and appends exactly one audit record per
// attempt regardless of where the attempt failed.

pub mod postgres;

pub use postgres::PgRowSource;

use crate::builder;
use crate::config::QueryConfig;
use crate::db::repositories::ExecutionRepository;
use crate::errors::{DatabaseError, ExecutionError};
use crate::models::{QueryExecution, QueryParameter, ReportQuery};
use crate::telemetry;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// One fetched page of rows, column order preserved
#[derive(Debug, Clone, Default)]
pub struct RowPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Source of result rows for assembled report SQL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch up to `count` rows starting at `offset`
    async fn fetch_page(
        &self,
        sql: &str,
        offset: i64,
        count: i64,
    ) -> Result<RowPage, ExecutionError>;
}

/// Sink for execution audit records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn append(&self, execution: &QueryExecution) -> Result<(), DatabaseError>;
}

#[async_trait]
impl ExecutionLog for ExecutionRepository {
    async fn append(&self, execution: &QueryExecution) -> Result<(), DatabaseError> {
        self.create(execution).await
    }
}

/// Wrap report SQL with OFFSET/FETCH pagination. A neutral ORDER BY is
/// appended first when the statement has none, since OFFSET requires one.
pub fn paginate_sql(sql: &str, offset: i64, count: i64) -> String {
    let has_order_by = sql.to_uppercase().contains("ORDER BY");

    let mut paginated = sql.trim_end().to_string();
    if !has_order_by {
        paginated.push_str("\nORDER BY (SELECT NULL)");
    }
    paginated.push_str(&format!(
        "\nOFFSET {} ROWS\nFETCH NEXT {} ROWS ONLY",
        offset, count
    ));
    paginated
}

/// Full result of one execution attempt, mirrored into the audit trail
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub data: Vec<Vec<serde_json::Value>>,
    pub columns: Vec<String>,
    pub total_rows: i64,
    pub execution_time: f64,
    pub error: Option<String>,
    pub sql: String,
    pub page: i64,
    pub page_size: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Orchestrates report execution against a row source with audit logging
pub struct QueryExecutor {
    rows: Arc<dyn RowSource>,
    audit: Arc<dyn ExecutionLog>,
    limits: QueryConfig,
}

impl QueryExecutor {
    pub fn new(rows: Arc<dyn RowSource>, audit: Arc<dyn ExecutionLog>, limits: QueryConfig) -> Self {
        Self {
            rows,
            audit,
            limits,
        }
    }

    /// Execute one page of a stored report.
    ///
    /// Never propagates validation, build, or query failures: they land in
    /// the outcome's `error` field. One audit record is appended whatever
    /// the result; a failed append is logged and does not mask the outcome.
    #[instrument(skip(self, query, parameters, values), fields(query_id = %query.id, page))]
    pub async fn execute(
        &self,
        query: &ReportQuery,
        parameters: &[QueryParameter],
        values: &HashMap<i32, String>,
        page: i64,
        page_size: Option<i64>,
        executed_by: &str,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let page = page.max(1);
        let page_size = page_size
            .unwrap_or(self.limits.results_per_page)
            .clamp(1, self.limits.max_results);

        let mut outcome = ExecutionOutcome {
            success: false,
            data: Vec::new(),
            columns: Vec::new(),
            total_rows: 0,
            execution_time: 0.0,
            error: None,
            sql: String::new(),
            page,
            page_size,
            has_next: false,
            has_previous: page > 1,
        };

        self.run_attempt(query, parameters, values, &mut outcome).await;

        outcome.execution_time = round_millis(started.elapsed().as_secs_f64());

        let record = QueryExecution::record(
            query.id,
            executed_by.to_string(),
            values,
            outcome.total_rows,
            outcome.execution_time,
            outcome.success,
            outcome.error.clone(),
            outcome.sql.clone(),
        );
        if let Err(e) = self.audit.append(&record).await {
            tracing::error!(error = %e, query_id = %query.id, "Failed to append audit record");
        }

        if outcome.success {
            telemetry::record_execution_success(&query.id, &query.name);
        } else {
            telemetry::record_execution_failure(&query.id, &query.name);
        }
        telemetry::record_execution_duration(&query.id, outcome.execution_time);

        outcome
    }

    async fn run_attempt(
        &self,
        query: &ReportQuery,
        parameters: &[QueryParameter],
        values: &HashMap<i32, String>,
        outcome: &mut ExecutionOutcome,
    ) {
        let check = builder::validate_parameters(parameters, values);
        if !check.valid {
            outcome.error = Some(check.errors.join("; "));
            return;
        }

        let sql = match builder::build_query(query, parameters, values) {
            Ok(sql) => sql,
            Err(e) => {
                outcome.error = Some(e.to_string());
                return;
            }
        };
        outcome.sql = sql.clone();

        let offset = (outcome.page - 1) * outcome.page_size;

        // One probe row beyond the page decides has_next
        match self
            .rows
            .fetch_page(&sql, offset, outcome.page_size + 1)
            .await
        {
            Ok(mut page_rows) => {
                if page_rows.rows.len() as i64 > outcome.page_size {
                    page_rows.rows.truncate(outcome.page_size as usize);
                    outcome.has_next = true;
                }

                outcome.success = true;
                outcome.total_rows = page_rows.rows.len() as i64;
                outcome.columns = if page_rows.columns.is_empty() && !page_rows.rows.is_empty() {
                    query.column_aliases()
                } else {
                    page_rows.columns
                };
                outcome.data = page_rows.rows;
            }
            Err(e) => {
                tracing::error!(error = %e, query_name = %query.name, "Report execution failed");
                outcome.error = Some(e.to_string());
            }
        }
    }

    /// Execute in test mode: first page only, capped row count, values
    /// synthesized from defaults and type placeholders when not supplied
    #[instrument(skip(self, query, parameters, test_values), fields(query_id = %query.id))]
    pub async fn execute_test(
        &self,
        query: &ReportQuery,
        parameters: &[QueryParameter],
        test_values: Option<HashMap<i32, String>>,
        executed_by: &str,
    ) -> ExecutionOutcome {
        let values = test_values.unwrap_or_else(|| builder::generate_test_values(parameters));

        self.execute(
            query,
            parameters,
            &values,
            1,
            Some(self.limits.test_row_limit),
            executed_by,
        )
        .await
    }

    /// Execute with the configured maximum row cap, for exports
    pub async fn execute_for_export(
        &self,
        query: &ReportQuery,
        parameters: &[QueryParameter],
        values: &HashMap<i32, String>,
        executed_by: &str,
    ) -> ExecutionOutcome {
        self.execute(
            query,
            parameters,
            values,
            1,
            Some(self.limits.max_results),
            executed_by,
        )
        .await
    }
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}
