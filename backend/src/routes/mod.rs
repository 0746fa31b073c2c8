//! Route definitions for the copper ledger API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Stage table (public)
        .route("/stages", get(handlers::list_stages))
        // Protected routes - stage ledgers
        .nest("/inventory", inventory_routes(state))
}

/// Inventory ledger routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_inventory))
        .route("/lookup", get(handlers::lookup_inventory))
        // Movements
        .route("/add", post(handlers::add_stock))
        .route("/remove", post(handlers::remove_stock))
        .route("/return", post(handlers::return_to_next_stage))
        // Single records
        .route(
            "/:record_id",
            get(handlers::get_inventory_record).delete(handlers::delete_inventory_item),
        )
        .route("/:record_id/history", get(handlers::get_inventory_history))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
