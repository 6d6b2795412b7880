use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use pos_auth::Permission;
use pos_catalog::{CreateCustomer, UpdateCustomer};
use pos_core::CustomerId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::authorize_action;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_customer).get(list_customers))
        .route("/:id", get(get_customer).put(update_customer).delete(delete_customer))
}

pub async fn create_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateCustomer>, JsonRejection>,
) -> axum::response::Response {
    if let Err(e) = authorize_action(&principal, Permission::CUSTOMERS_WRITE) {
        return errors::forbidden(e);
    }
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.create_customer(body).await {
        Ok(customer) => (StatusCode::CREATED, Json(dto::customer_to_json(customer))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = authorize_action(&principal, Permission::CUSTOMERS_READ) {
        return errors::forbidden(e);
    }

    match services.list_customers().await {
        Ok(customers) => {
            let items = customers.into_iter().map(dto::customer_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authorize_action(&principal, Permission::CUSTOMERS_READ) {
        return errors::forbidden(e);
    }
    let id: CustomerId = match dto::parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get_customer(id).await {
        Ok(Some(customer)) => (StatusCode::OK, Json(dto::customer_to_json(customer))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "customer not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateCustomer>, JsonRejection>,
) -> axum::response::Response {
    if let Err(e) = authorize_action(&principal, Permission::CUSTOMERS_WRITE) {
        return errors::forbidden(e);
    }
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let id: CustomerId = match dto::parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.update_customer(id, body).await {
        Ok(customer) => (StatusCode::OK, Json(dto::customer_to_json(customer))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = authorize_action(&principal, Permission::CUSTOMERS_WRITE) {
        return errors::forbidden(e);
    }
    let id: CustomerId = match dto::parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.delete_customer(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
