// Execution audit repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::QueryExecution;
use chrono::{Duration, Utc};
use tracing::instrument;
use uuid::Uuid;

const EXECUTION_COLUMNS: &str = r#"
    id, query_id, executed_by, parameters, total_rows, execution_time,
    success, error_message, executed_sql, executed_at
"#;

/// Repository for the append-only execution audit trail
pub struct ExecutionRepository {
    pool: DbPool,
}

impl ExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append one audit record. Records are never updated afterwards.
    #[instrument(skip(self, execution), fields(query_id = %execution.query_id))]
    pub async fn create(&self, execution: &QueryExecution) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO query_executions (
                id, query_id, executed_by, parameters, total_rows, execution_time,
                success, error_message, executed_sql, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(execution.id)
        .bind(execution.query_id)
        .bind(&execution.executed_by)
        .bind(&execution.parameters)
        .bind(execution.total_rows)
        .bind(execution.execution_time)
        .bind(execution.success)
        .bind(&execution.error_message)
        .bind(&execution.executed_sql)
        .bind(execution.executed_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(
            execution_id = %execution.id,
            success = execution.success,
            "Execution recorded"
        );
        Ok(())
    }

    /// Find one audit record by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<QueryExecution>, DatabaseError> {
        let execution = sqlx::query_as::<_, QueryExecution>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM query_executions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(execution)
    }

    /// List audit records, newest first, with optional filters
    #[instrument(skip(self))]
    pub async fn find_with_filter(
        &self,
        filter: ExecutionFilter,
    ) -> Result<Vec<QueryExecution>, DatabaseError> {
        let mut sql = format!(
            "SELECT {EXECUTION_COLUMNS} FROM query_executions WHERE 1 = 1"
        );
        let mut param_count = 1;

        if filter.query_id.is_some() {
            sql.push_str(&format!(" AND query_id = ${}", param_count));
            param_count += 1;
        }

        if filter.success.is_some() {
            sql.push_str(&format!(" AND success = ${}", param_count));
            param_count += 1;
        }

        if filter.executed_by.is_some() {
            sql.push_str(&format!(" AND executed_by = ${}", param_count));
        }

        sql.push_str(" ORDER BY executed_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut query_builder = sqlx::query_as::<_, QueryExecution>(&sql);

        if let Some(query_id) = filter.query_id {
            query_builder = query_builder.bind(query_id);
        }

        if let Some(success) = filter.success {
            query_builder = query_builder.bind(success);
        }

        if let Some(executed_by) = filter.executed_by {
            query_builder = query_builder.bind(executed_by);
        }

        let executions = query_builder.fetch_all(self.pool.pool()).await?;

        tracing::debug!(count = executions.len(), "Found executions with filter");
        Ok(executions)
    }

    /// List the recent audit records for one query
    #[instrument(skip(self))]
    pub async fn find_by_query_id(
        &self,
        query_id: Uuid,
        limit: i64,
    ) -> Result<Vec<QueryExecution>, DatabaseError> {
        let executions = sqlx::query_as::<_, QueryExecution>(&format!(
            r#"
            SELECT {EXECUTION_COLUMNS}
            FROM query_executions
            WHERE query_id = $1
            ORDER BY executed_at DESC
            LIMIT $2
            "#
        ))
        .bind(query_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(executions)
    }

    /// Delete audit records older than the given retention window.
    /// Used by cleanup tasks.
    #[instrument(skip(self))]
    pub async fn delete_older_than(&self, days: i64) -> Result<u64, DatabaseError> {
        let cutoff = Utc::now() - Duration::days(days);

        let result = sqlx::query("DELETE FROM query_executions WHERE executed_at < $1")
            .bind(cutoff)
            .execute(self.pool.pool())
            .await?;

        let deleted = result.rows_affected();
        tracing::info!(deleted_count = deleted, "Deleted old execution records");
        Ok(deleted)
    }
}

/// Filter for querying the audit trail
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub query_id: Option<Uuid>,
    pub success: Option<bool>,
    pub executed_by: Option<String>,
    pub limit: Option<i64>,
}
