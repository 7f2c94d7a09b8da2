use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::RequireAdmin;
use super::json_body;
use crate::models::Actor;
use crate::services::orders::BillingInfo;
use crate::services::{CreateOrder, TicketRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    pub tickets: Vec<TicketRequest>,
    pub promotion_code: Option<String>,
    #[serde(flatten)]
    pub billing: BillingInfo,
}

pub async fn create_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(event_id): Path<Uuid>,
    payload: Result<Json<CreateOrderBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = json_body(payload)?;
    let details = state
        .orders
        .create_order(CreateOrder {
            user_id: actor.user_id,
            event_id,
            tickets: body.tickets,
            promotion_code: body.promotion_code,
            billing: body.billing,
        })
        .await?;
    Ok(created(details, "Order created"))
}

pub async fn get_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let details = state.orders.get_order(&actor, order_id).await?;
    Ok(success(details, "Order retrieved"))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let order = state.orders.cancel_order(&actor, order_id).await?;
    Ok(success(order, "Order cancelled"))
}

/// Called by an external scheduler.
pub async fn expire_pending_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Response, AppError> {
    let report = state.orders.expire_pending(state.pending_order_ttl).await?;
    Ok(success(report, "Pending order sweep finished"))
}
