use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::json_body;
use crate::models::{Actor, PaymentMethod};
use crate::payments::CallbackPayload;
use crate::services::{CallbackOutcome, RefundRequest};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentBody {
    pub order_id: Uuid,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
struct CallbackAck {
    outcome: &'static str,
}

fn acknowledge(outcome: CallbackOutcome) -> Response {
    success(
        CallbackAck {
            outcome: outcome.as_str(),
        },
        "Callback received",
    )
}

pub async fn initialize_payment(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<InitializePaymentBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = json_body(payload)?;
    let initiation = state
        .payments
        .initiate(&actor, body.order_id, body.payment_method)
        .await?;
    Ok(success(initiation, "Payment initiated"))
}

/// Server-to-server notification. Anything we cannot use is acknowledged
/// and dropped so the provider does not retry it.
pub async fn payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload = match serde_json::from_slice::<CallbackPayload>(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Malformed webhook payload dropped");
            return Ok(acknowledge(CallbackOutcome::Ignored));
        }
    };

    let outcome = state.payments.on_callback(&provider, &payload).await?;
    Ok(acknowledge(outcome))
}

/// Browser return from the provider, carrying the same signed fields as
/// query parameters.
pub async fn payment_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    query: Result<Query<CallbackPayload>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(payload) = match query {
        Ok(query) => query,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Malformed callback query dropped");
            return Ok(acknowledge(CallbackOutcome::Ignored));
        }
    };

    let outcome = state.payments.on_callback(&provider, &payload).await?;
    Ok(acknowledge(outcome))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let details = state.payments.refund(&actor, request).await?;
    Ok(success(details, "Order refunded"))
}
