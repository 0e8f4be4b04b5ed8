use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Query definition endpoints
        .route("/api/queries", post(handlers::queries::create_query))
        .route("/api/queries", get(handlers::queries::list_queries))
        .route("/api/queries/validate", post(handlers::queries::validate_query))
        .route("/api/queries/:id", get(handlers::queries::get_query))
        .route("/api/queries/:id", put(handlers::queries::update_query))
        .route("/api/queries/:id", delete(handlers::queries::delete_query))
        .route(
            "/api/queries/:id/parameters",
            put(handlers::queries::replace_parameters),
        )
        // Execution endpoints
        .route(
            "/api/queries/:id/execute",
            post(handlers::executions::execute_query),
        )
        .route("/api/queries/:id/test", post(handlers::executions::test_query))
        .route(
            "/api/queries/:id/export",
            post(handlers::export::export_query),
        )
        // Audit trail endpoints
        .route(
            "/api/queries/:id/executions",
            get(handlers::executions::list_query_executions),
        )
        .route(
            "/api/executions",
            get(handlers::executions::list_executions)
                .delete(handlers::executions::purge_executions),
        )
        .route(
            "/api/executions/:id",
            get(handlers::executions::get_execution),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
