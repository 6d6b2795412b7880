//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: backend selection (in-memory or Postgres) and dispatch
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};

use pos_infra::AppConfig;
use pos_infra::store::{InMemoryStore, StoreError};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Router over a fresh in-memory store. Used by tests and local runs.
pub fn build_app(jwt_secret: String) -> Router {
    let cors_origins = AppConfig::default().cors_allowed_origins;
    router(jwt_secret, &cors_origins, services::build_in_memory(InMemoryStore::new()))
}

/// Router over the backend selected by `config`.
pub async fn build_app_with_config(config: &AppConfig) -> Result<Router, StoreError> {
    let services = services::build_services(config).await?;
    Ok(router(config.jwt_secret.clone(), &config.cors_allowed_origins, services))
}

/// Build the full HTTP router around already-wired services.
pub fn router(jwt_secret: String, cors_origins: &[String], services: AppServices) -> Router {
    let jwt = Arc::new(pos_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    tracing::info!(backend = services.backend_name(), "building router");

    // Protected routes: auth runs first, then services are attached.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                auth_state,
                middleware::auth_middleware,
            ))
            .layer(Extension(Arc::new(services))),
    );

    // CORS wraps auth so browser preflights are answered without a token.
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(cors_layer(cors_origins))
}

/// CORS policy for the dashboard client: listed origins only, bearer auth.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "skipping unusable CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
