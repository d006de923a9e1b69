use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{AppState, handlers, rate_limit};

/// All routes with state attached. Transport layers (tracing, compression,
/// request ids) are added by the binary.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/catalog", get(handlers::catalog_page))
        .route("/catalog/borrow", post(handlers::catalog_borrow))
        .route(
            "/api/v1/books",
            get(handlers::list_books).post(handlers::create_book),
        )
        .route("/api/v1/books/{isbn}", get(handlers::get_book))
        .route("/api/v1/loans", post(handlers::borrow_book))
        .route("/api/v1/returns", post(handlers::return_book))
        .route("/api/v1/search", get(handlers::search_books))
        .route(
            "/api/v1/late-fees/{patron_id}/{isbn}",
            get(handlers::late_fee),
        )
        .route("/api/v1/late-fees/payments", post(handlers::pay_late_fees))
        .route("/api/v1/late-fees/refunds", post(handlers::refund_late_fee))
        .route(
            "/api/v1/patrons/{patron_id}/status",
            get(handlers::patron_status),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(api_routes)
        .with_state(state)
}
