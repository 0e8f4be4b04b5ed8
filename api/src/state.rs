use std::sync::Arc;

use common::config::Settings;
use common::db::repositories::ExecutionRepository;
use common::db::DbPool;
use common::executor::{PgRowSource, QueryExecutor};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub executor: Arc<QueryExecutor>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(db_pool: DbPool, config: &Settings) -> Self {
        let rows = Arc::new(PgRowSource::new(
            db_pool.clone(),
            config.query.timeout_seconds,
        ));
        let audit = Arc::new(ExecutionRepository::new(db_pool.clone()));
        let executor = Arc::new(QueryExecutor::new(rows, audit, config.query.clone()));

        Self { db_pool, executor }
    }
}
