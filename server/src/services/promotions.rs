//! Promotion codes: validation, discount computation and counted redemption.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{DiscountType, Promotion};
use crate::store::UnitOfWork;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct Redemption {
    pub promotion_id: Uuid,
    pub code: String,
    pub discount: Decimal,
}

/// Discount for a subtotal, always within `[0, subtotal]` and rounded to cents.
pub fn compute_discount(
    discount_type: DiscountType,
    discount_value: Decimal,
    subtotal: Decimal,
) -> Decimal {
    if subtotal <= Decimal::ZERO || discount_value <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let raw = match discount_type {
        DiscountType::Percentage => subtotal * discount_value / Decimal::ONE_HUNDRED,
        DiscountType::Fixed => discount_value,
    };

    raw.round_dp(2).max(Decimal::ZERO).min(subtotal)
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Existence, activity and date window checks, in that order. Usage limits
/// are left to [`redeem`], which enforces them atomically.
fn validate(promotion: Option<Promotion>, code: &str, now: DateTime<Utc>) -> Result<Promotion, AppError> {
    let promotion = promotion
        .filter(|promotion| promotion.is_active)
        .ok_or_else(|| AppError::PromotionInvalid(format!("Promotion code '{code}' is not valid for this event")))?;

    if !promotion.is_within_window(now) {
        return Err(AppError::PromotionExpired(format!(
            "Promotion code '{code}' is not currently active"
        )));
    }

    Ok(promotion)
}

/// Computes the discount a code would give without counting a use.
pub async fn preview(
    uow: &mut dyn UnitOfWork,
    code: &str,
    event_id: Uuid,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<Redemption, AppError> {
    let code = normalize_code(code);
    let promotion = validate(uow.lock_promotion_by_code(event_id, &code).await?, &code, now)?;

    if !promotion.has_uses_left() {
        return Err(AppError::PromotionExhausted(format!(
            "Promotion code '{code}' has been fully redeemed"
        )));
    }

    Ok(Redemption {
        promotion_id: promotion.id,
        discount: compute_discount(promotion.discount_type, promotion.discount_value, subtotal),
        code,
    })
}

/// Validates the code and counts one use inside the caller's unit of work,
/// so the use commits or rolls back together with the order.
pub async fn redeem(
    uow: &mut dyn UnitOfWork,
    code: &str,
    event_id: Uuid,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<Redemption, AppError> {
    let code = normalize_code(code);
    let promotion = validate(uow.lock_promotion_by_code(event_id, &code).await?, &code, now)?;

    if !uow.increment_promotion_use(promotion.id, now).await? {
        warn!(promotion_id = %promotion.id, code = %code, "Promotion exhausted");
        return Err(AppError::PromotionExhausted(format!(
            "Promotion code '{code}' has been fully redeemed"
        )));
    }

    let discount = compute_discount(promotion.discount_type, promotion.discount_value, subtotal);
    info!(promotion_id = %promotion.id, code = %code, discount = %discount, "Promotion redeemed");

    Ok(Redemption {
        promotion_id: promotion.id,
        code,
        discount,
    })
}

/// Gives back the use an order consumed. Idempotent per order.
pub async fn release(
    uow: &mut dyn UnitOfWork,
    order_id: Uuid,
    promotion_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let Some(promotion_id) = promotion_id else {
        return Ok(false);
    };

    if !uow.mark_promotion_released(order_id).await? {
        return Ok(false);
    }

    if !uow.decrement_promotion_use(promotion_id, now).await? {
        warn!(
            promotion_id = %promotion_id,
            order_id = %order_id,
            "Promotion usage already at zero on release"
        );
    }

    info!(promotion_id = %promotion_id, order_id = %order_id, "Promotion use released");
    Ok(true)
}
