// Query parameter repository implementation

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::QueryParameter;
use sqlx::{Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

const PARAMETER_COLUMNS: &str = r#"
    id, query_id, internal_name, label, data_type, orden,
    visible, required, default_value, placeholder, where_position
"#;

/// Repository for the parameter definitions attached to report queries
pub struct ParameterRepository {
    pool: DbPool,
}

impl ParameterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// List the parameters of a query ordered for form rendering
    #[instrument(skip(self))]
    pub async fn find_by_query_id(
        &self,
        query_id: Uuid,
    ) -> Result<Vec<QueryParameter>, DatabaseError> {
        let parameters = sqlx::query_as::<_, QueryParameter>(&format!(
            r#"
            SELECT {PARAMETER_COLUMNS}
            FROM query_parameters
            WHERE query_id = $1
            ORDER BY orden, where_position
            "#
        ))
        .bind(query_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(parameters)
    }

    /// Replace the full parameter set of a query in one transaction.
    ///
    /// The WHERE template and its parameters are edited together in the
    /// authoring UI; replacing wholesale keeps positions and rows from
    /// drifting apart when placeholders are renumbered.
    #[instrument(skip(self, parameters), fields(count = parameters.len()))]
    pub async fn replace_for_query(
        &self,
        query_id: Uuid,
        parameters: &[QueryParameter],
    ) -> Result<(), DatabaseError> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Self::replace_in(&mut tx, query_id, parameters).await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(query_id = %query_id, count = parameters.len(), "Parameters replaced");
        Ok(())
    }

    /// Replace the parameter set within a caller-owned transaction, so the
    /// query row and its parameters commit or roll back together.
    pub(crate) async fn replace_in(
        tx: &mut Transaction<'_, Postgres>,
        query_id: Uuid,
        parameters: &[QueryParameter],
    ) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM query_parameters WHERE query_id = $1")
            .bind(query_id)
            .execute(&mut **tx)
            .await?;

        for param in parameters {
            sqlx::query(
                r#"
                INSERT INTO query_parameters (
                    id, query_id, internal_name, label, data_type, orden,
                    visible, required, default_value, placeholder, where_position
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(param.id)
            .bind(query_id)
            .bind(&param.internal_name)
            .bind(&param.label)
            .bind(param.data_type.to_string())
            .bind(param.orden)
            .bind(param.visible)
            .bind(param.required)
            .bind(&param.default_value)
            .bind(&param.placeholder)
            .bind(param.where_position)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Remove parameters whose position no longer appears in the WHERE
    /// template. Runs inside the caller's transaction and returns the number
    /// of rows pruned.
    pub(crate) async fn prune_in(
        tx: &mut Transaction<'_, Postgres>,
        query_id: Uuid,
        live_positions: &[i32],
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM query_parameters WHERE query_id = $1 AND where_position <> ALL($2)",
        )
        .bind(query_id)
        .bind(live_positions)
        .execute(&mut **tx)
        .await?;

        let pruned = result.rows_affected();
        if pruned > 0 {
            tracing::info!(query_id = %query_id, pruned, "Pruned stale parameters");
        }
        Ok(pruned)
    }
}
