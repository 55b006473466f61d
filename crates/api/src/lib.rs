//! HTTP API server for the storefront checkout core.
//!
//! Exposes the catalog, carts, checkout, direct buy and order history as
//! JSON endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{CheckoutConfig, CheckoutCoordinator};
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::RecordStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RecordStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health::<S>))
        .route("/checkout", post(routes::checkout::checkout::<S>))
        .route("/direct-buy", post(routes::checkout::direct_buy::<S>))
        .route("/cart", post(routes::carts::add_item::<S>))
        .route(
            "/cart/{user_id}",
            get(routes::carts::get::<S>).delete(routes::carts::clear::<S>),
        )
        .route(
            "/cart/{user_id}/{product_id}",
            put(routes::carts::update_quantity::<S>).delete(routes::carts::remove_item::<S>),
        )
        .route(
            "/products",
            get(routes::products::list::<S>).post(routes::products::create::<S>),
        )
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/status",
            put(routes::orders::update_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a store.
pub fn create_default_state<S: RecordStore + Clone + 'static>(
    store: S,
    config: CheckoutConfig,
    backend: &'static str,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        coordinator: CheckoutCoordinator::with_config(store, config),
        backend,
    })
}
