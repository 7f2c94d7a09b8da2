use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::models::Actor;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn check_in(
    State(state): State<AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let item = state.checkin.check_in(&actor, booking_id).await?;
    Ok(success(item, "Ticket checked in"))
}
