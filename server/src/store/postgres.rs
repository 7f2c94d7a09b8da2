use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{NewOrder, NewOrderItem, NewPayment, PaymentUpdate, Store, UnitOfWork};
use crate::models::{
    Event, Order, OrderItem, OrderStatus, PaymentTransaction, Promotion, TicketType,
};
use crate::utils::error::AppError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }
}

/// One Postgres transaction. Row locks taken with `FOR UPDATE` are held
/// until commit or rollback; dropping without commit rolls back.
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn conn(&mut self) -> Result<&mut PgConnection, AppError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| AppError::InternalServerError("transaction already finished".to_string()))
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn event(&mut self, id: Uuid) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(event)
    }

    async fn ticket_type(&mut self, id: Uuid) -> Result<Option<TicketType>, AppError> {
        let ticket_type = sqlx::query_as::<_, TicketType>("SELECT * FROM ticket_types WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(ticket_type)
    }

    async fn ticket_types_for_event(
        &mut self,
        event_id: Uuid,
    ) -> Result<Vec<TicketType>, AppError> {
        let rows = sqlx::query_as::<_, TicketType>(
            "SELECT * FROM ticket_types WHERE event_id = $1 ORDER BY price ASC, name ASC",
        )
        .bind(event_id)
        .fetch_all(self.conn()?)
        .await?;
        Ok(rows)
    }

    async fn increment_sold(
        &mut self,
        id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TicketType>, AppError> {
        // The WHERE clause is the oversell guard: the row lock taken by the
        // UPDATE serialises concurrent reservations on this ticket type only.
        // `quantity - $2` cannot leave int4 range for a positive $2.
        let row = sqlx::query_as::<_, TicketType>(
            r#"UPDATE ticket_types
               SET sold = sold + $2, updated_at = $3
               WHERE id = $1 AND sold <= quantity - $2
               RETURNING *"#,
        )
        .bind(id)
        .bind(quantity)
        .bind(now)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn decrement_sold(
        &mut self,
        id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TicketType>, AppError> {
        let row = sqlx::query_as::<_, TicketType>(
            r#"UPDATE ticket_types
               SET sold = sold - $2, updated_at = $3
               WHERE id = $1 AND sold >= $2
               RETURNING *"#,
        )
        .bind(id)
        .bind(quantity)
        .bind(now)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn lock_promotion_by_code(
        &mut self,
        event_id: Uuid,
        code: &str,
    ) -> Result<Option<Promotion>, AppError> {
        let promotion = sqlx::query_as::<_, Promotion>(
            "SELECT * FROM promotions WHERE event_id = $1 AND code = $2 FOR UPDATE",
        )
        .bind(event_id)
        .bind(code)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(promotion)
    }

    async fn increment_promotion_use(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"UPDATE promotions
               SET used = used + 1, updated_at = $2
               WHERE id = $1 AND (max_uses IS NULL OR used < max_uses)"#,
        )
        .bind(id)
        .bind(now)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn decrement_promotion_use(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE promotions SET used = used - 1, updated_at = $2 WHERE id = $1 AND used > 0",
        )
        .bind(id)
        .bind(now)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, Order>(
            r#"INSERT INTO orders
                   (id, user_id, event_id, booking_reference, total_amount, discount_amount,
                    status, promotion_id, billing_name, billing_email, billing_address,
                    created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9, $10, $11, $11)
               ON CONFLICT (booking_reference) DO NOTHING
               RETURNING *"#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.event_id)
        .bind(&order.booking_reference)
        .bind(order.total_amount)
        .bind(order.discount_amount)
        .bind(order.promotion_id)
        .bind(&order.billing_name)
        .bind(&order.billing_email)
        .bind(&order.billing_address)
        .bind(order.created_at)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn insert_order_item(
        &mut self,
        item: &NewOrderItem,
    ) -> Result<Option<OrderItem>, AppError> {
        // ON CONFLICT keeps the transaction usable so the caller can retry
        // with a fresh code.
        let row = sqlx::query_as::<_, OrderItem>(
            r#"INSERT INTO order_items
                   (id, order_id, ticket_type_id, quantity, unit_price, total_price, ticket_code,
                    attendee_name, attendee_email, check_in_status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'not_checked', $10)
               ON CONFLICT (ticket_code) DO NOTHING
               RETURNING *"#,
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.ticket_type_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(&item.ticket_code)
        .bind(&item.attendee_name)
        .bind(&item.attendee_email)
        .bind(item.created_at)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>, AppError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(order)
    }

    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, AppError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(order)
    }

    async fn set_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Order, AppError> {
        let order = sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .bind(now)
        .fetch_optional(self.conn()?)
        .await?;
        order.ok_or_else(|| AppError::NotFound(format!("Order '{id}' was not found")))
    }

    async fn mark_promotion_released(&mut self, order_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"UPDATE orders SET promotion_released = TRUE
               WHERE id = $1 AND promotion_id IS NOT NULL AND NOT promotion_released"#,
        )
        .bind(order_id)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn stale_pending_orders(
        &mut self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"SELECT id FROM orders
               WHERE status = 'pending' AND created_at < $1
               ORDER BY created_at ASC
               LIMIT $2"#,
        )
        .bind(created_before)
        .bind(limit)
        .fetch_all(self.conn()?)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, AppError> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(self.conn()?)
        .await?;
        Ok(items)
    }

    async fn lock_order_item(&mut self, id: Uuid) -> Result<Option<OrderItem>, AppError> {
        let item = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(item)
    }

    async fn mark_item_released(&mut self, item_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE order_items SET inventory_released = TRUE WHERE id = $1 AND NOT inventory_released",
        )
        .bind(item_id)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cancel_unchecked_items(&mut self, order_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"UPDATE order_items SET check_in_status = 'cancelled'
               WHERE order_id = $1 AND check_in_status = 'not_checked'"#,
        )
        .bind(order_id)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_item_checked_in(
        &mut self,
        item_id: Uuid,
        checked_in_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<OrderItem>, AppError> {
        let item = sqlx::query_as::<_, OrderItem>(
            r#"UPDATE order_items
               SET check_in_status = 'checked_in', checked_in_at = $3, checked_in_by = $2
               WHERE id = $1 AND check_in_status = 'not_checked'
               RETURNING *"#,
        )
        .bind(item_id)
        .bind(checked_in_by)
        .bind(at)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(item)
    }

    async fn insert_payment(
        &mut self,
        payment: &NewPayment,
    ) -> Result<Option<PaymentTransaction>, AppError> {
        let row = sqlx::query_as::<_, PaymentTransaction>(
            r#"INSERT INTO payment_transactions
                   (id, order_id, provider, reference, method, status, amount, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $7)
               ON CONFLICT (reference) DO NOTHING
               RETURNING *"#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.provider)
        .bind(&payment.reference)
        .bind(payment.method)
        .bind(payment.amount)
        .bind(payment.created_at)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn lock_payment_by_reference(
        &mut self,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, AppError> {
        let row = sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE reference = $1 FOR UPDATE",
        )
        .bind(reference)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn payment_by_transaction_id(
        &mut self,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, AppError> {
        let row = sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE provider = $1 AND transaction_id = $2",
        )
        .bind(provider)
        .bind(transaction_id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn update_payment(
        &mut self,
        id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<PaymentTransaction, AppError> {
        let row = sqlx::query_as::<_, PaymentTransaction>(
            r#"UPDATE payment_transactions
               SET status = $2,
                   transaction_id = COALESCE($3, transaction_id),
                   refunded_amount = COALESCE($4, refunded_amount),
                   failure_reason = COALESCE($5, failure_reason),
                   updated_at = $6
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(update.status)
        .bind(&update.transaction_id)
        .bind(update.refunded_amount)
        .bind(&update.failure_reason)
        .bind(update.updated_at)
        .fetch_optional(self.conn()?)
        .await?;
        row.ok_or_else(|| AppError::NotFound(format!("Payment transaction '{id}' was not found")))
    }

    async fn payments_for_order(
        &mut self,
        order_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, AppError> {
        let rows = sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(self.conn()?)
        .await?;
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        match self.tx.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(AppError::InternalServerError(
                "transaction already finished".to_string(),
            )),
        }
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
