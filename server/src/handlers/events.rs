use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::json_body;
use crate::models::Actor;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct ValidatePromotionBody {
    pub code: String,
    pub subtotal: Decimal,
}

pub async fn list_ticket_types(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let availability = state.orders.ticket_availability(event_id).await?;
    Ok(success(availability, "Ticket availability retrieved"))
}

pub async fn validate_promotion(
    State(state): State<AppState>,
    _actor: Actor,
    Path(event_id): Path<Uuid>,
    payload: Result<Json<ValidatePromotionBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = json_body(payload)?;
    let redemption = state
        .orders
        .preview_promotion(event_id, &body.code, body.subtotal)
        .await?;
    Ok(success(redemption, "Promotion code is valid"))
}
