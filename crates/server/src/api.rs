//! JSON API routes for pricing policies and versioned work orders.
//!
//! Endpoints:
//! - `GET    /api/policies`            — list pricing policies
//! - `POST   /api/policies`            — create or update a pricing policy
//! - `POST   /api/pricing/preview`     — price an amount against selected policies
//! - `POST   /api/orders`              — create an order with its version-1 snapshot
//! - `GET    /api/orders/{id}`         — fetch an order with full snapshot history
//! - `PUT    /api/orders/{id}/items`   — re-price items and append the next snapshot
//! - `PUT    /api/orders/{id}/status`  — transition the order status
//! - `DELETE /api/orders/{id}`         — remove an order and its history

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::domain::order::{Order, OrderId, OrderStatus};
use atelier_core::domain::policy::{PolicyId, PolicyRule, PricingPolicy};
use atelier_core::domain::snapshot::{ClientInfo, LineItem, ProjectInfo};
use atelier_core::errors::{ApplicationError, DomainError, InterfaceError};
use atelier_core::pricing::{
    calculate_price_with_policies, format_calculation_details, PriceCalculation,
};
use atelier_db::repositories::{
    OrderRepository, PolicyRepository, RepositoryError, SqlOrderRepository, SqlPolicyRepository,
};
use atelier_db::DbPool;

#[derive(Clone)]
pub struct ApiState {
    policies: Arc<dyn PolicyRepository>,
    orders: Arc<dyn OrderRepository>,
}

impl ApiState {
    pub fn new(policies: Arc<dyn PolicyRepository>, orders: Arc<dyn OrderRepository>) -> Self {
        Self { policies, orders }
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self::new(
            Arc::new(SqlPolicyRepository::new(pool.clone())),
            Arc::new(SqlOrderRepository::new(pool)),
        )
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/policies", get(list_policies).post(save_policy))
        .route("/api/pricing/preview", post(preview_pricing))
        .route("/api/orders", post(create_order))
        .route("/api/orders/{id}", get(get_order).delete(delete_order))
        .route("/api/orders/{id}/items", put(revise_order_items))
        .route("/api/orders/{id}/status", put(update_order_status))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub original_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub selected_policy_ids: Vec<PolicyId>,
    #[serde(default = "default_unit")]
    pub unit: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    #[serde(flatten)]
    pub calculation: PriceCalculation,
    pub display_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_no: String,
    pub client_info: ClientInfo,
    pub project_info: ProjectInfo,
    pub items: Vec<LineItem>,
    #[serde(default = "default_actor")]
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviseItemsRequest {
    pub items: Vec<LineItem>,
    #[serde(default = "default_actor")]
    pub updated_by: String,
    /// Optimistic concurrency token. Defaults to the version read from the
    /// database, which makes single-writer clients just work.
    #[serde(default)]
    pub expected_version: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

fn default_unit() -> String {
    "件".to_string()
}

fn default_actor() -> String {
    "system".to_string()
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(InterfaceError);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    correlation_id: String,
}

fn new_correlation_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4())
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self(InterfaceError::Internal {
            message: message.into(),
            correlation_id: new_correlation_id(),
        })
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self(ApplicationError::NotFound(message.into()).into_interface(new_correlation_id()))
    }
}

impl From<ApplicationError> for ApiError {
    fn from(value: ApplicationError) -> Self {
        Self(value.into_interface(new_correlation_id()))
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        ApplicationError::from(value).into()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::from(value).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::warn!(
            event_name = "api.request.failed",
            correlation_id = %self.0.correlation_id(),
            status = %status,
            error = %self.0,
            "request failed"
        );

        let body = ErrorBody {
            error: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_policies(
    State(state): State<ApiState>,
) -> Result<Json<Vec<PricingPolicy>>, ApiError> {
    let policies = state.policies.list().await?;
    Ok(Json(policies))
}

async fn save_policy(
    State(state): State<ApiState>,
    Json(policy): Json<PricingPolicy>,
) -> Result<(StatusCode, Json<PricingPolicy>), ApiError> {
    validate_policy(&policy)?;
    state.policies.save(&policy).await?;

    tracing::info!(
        event_name = "api.policy.saved",
        policy_id = %policy.id.0,
        policy_type = policy.rule.type_label(),
        "pricing policy saved"
    );
    Ok((StatusCode::CREATED, Json(policy)))
}

async fn preview_pricing(
    State(state): State<ApiState>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let policies = state.policies.list().await?;
    let calculation = calculate_price_with_policies(
        request.original_price,
        request.quantity,
        &policies,
        &request.selected_policy_ids,
        &request.unit,
    );
    let display_text = format_calculation_details(&calculation);

    Ok(Json(PreviewResponse { calculation, display_text }))
}

async fn create_order(
    State(state): State<ApiState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    if request.order_no.trim().is_empty() {
        return Err(DomainError::InvariantViolation("order_no must not be empty".into()).into());
    }
    validate_line_items(&request.items)?;

    let policies = state.policies.list().await?;
    let order = Order::create(
        OrderId(format!("order-{}", uuid::Uuid::new_v4())),
        request.order_no,
        request.client_info,
        request.project_info,
        &request.items,
        &policies,
        &request.created_by,
        Utc::now(),
    );
    state.orders.insert(&order).await?;

    tracing::info!(
        event_name = "api.order.created",
        order_id = %order.id.0,
        order_no = %order.order_no,
        total_amount = %order.current_amount,
        "order created"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .orders
        .find_by_id(&OrderId(id.clone()))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("order `{id}`")))?;
    Ok(Json(order))
}

async fn revise_order_items(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ReviseItemsRequest>,
) -> Result<Json<Order>, ApiError> {
    validate_line_items(&request.items)?;

    let mut order = state
        .orders
        .find_by_id(&OrderId(id.clone()))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("order `{id}`")))?;
    if order.status == OrderStatus::Cancelled {
        return Err(DomainError::InvariantViolation(
            "cancelled orders cannot be revised".into(),
        )
        .into());
    }

    let expected_version = request.expected_version.unwrap_or(order.current_version);
    let policies = state.policies.list().await?;
    let version = order.revise(&request.items, &policies, &request.updated_by, Utc::now());
    let snapshot = order
        .snapshot_at(version)
        .cloned()
        .ok_or_else(|| ApiError::internal("revision produced no snapshot"))?;

    state.orders.append_snapshot(&order.id, expected_version, &snapshot).await?;

    tracing::info!(
        event_name = "api.order.revised",
        order_id = %order.id.0,
        version_number = version,
        total_amount = %order.current_amount,
        "order items revised"
    );
    Ok(Json(order))
}

async fn update_order_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let mut order = state
        .orders
        .find_by_id(&OrderId(id.clone()))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("order `{id}`")))?;

    order.transition_to(request.status)?;
    let now = Utc::now();
    let updated = state.orders.update_status(&order.id, request.status, now).await?;
    if !updated {
        return Err(ApiError::not_found(format!("order `{id}`")));
    }
    order.updated_at = now;

    tracing::info!(
        event_name = "api.order.status_updated",
        order_id = %order.id.0,
        status = ?request.status,
        "order status updated"
    );
    Ok(Json(order))
}

async fn delete_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.orders.delete(&OrderId(id.clone())).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("order `{id}`")));
    }

    tracing::info!(event_name = "api.order.deleted", order_id = %id, "order deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Boundary validation
// ---------------------------------------------------------------------------

fn validate_line_items(items: &[LineItem]) -> Result<(), ApiError> {
    for item in items {
        if item.quantity == 0 {
            return Err(DomainError::InvalidLineItemQuantity {
                service_id: item.service_id.clone(),
                quantity: item.quantity,
            }
            .into());
        }
        if item.unit_price < Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "line item `{}` has negative unit price",
                item.service_id
            ))
            .into());
        }
    }
    Ok(())
}

fn validate_policy(policy: &PricingPolicy) -> Result<(), ApiError> {
    if policy.id.0.trim().is_empty() {
        return Err(DomainError::InvariantViolation("policy id must not be empty".into()).into());
    }

    let ratio_in_range = |ratio: &Decimal| *ratio >= Decimal::ZERO && *ratio <= Decimal::ONE_HUNDRED;
    match &policy.rule {
        PolicyRule::UniformDiscount { discount_ratio } => {
            if !ratio_in_range(discount_ratio) {
                return Err(DomainError::InvariantViolation(
                    "discount ratio must be within 0..=100".into(),
                )
                .into());
            }
        }
        PolicyRule::TieredDiscount { tier_settings } => {
            if tier_settings.is_empty() {
                return Err(DomainError::InvariantViolation(
                    "tiered policy requires at least one tier".into(),
                )
                .into());
            }
            if tier_settings.iter().any(|tier| !ratio_in_range(&tier.discount_ratio)) {
                return Err(DomainError::InvariantViolation(
                    "tier discount ratios must be within 0..=100".into(),
                )
                .into());
            }
        }
    }

    Ok(())
}
