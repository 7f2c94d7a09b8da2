use chrono::Duration;
use std::sync::Arc;

use crate::clock::Clock;
use crate::payments::PaymentProvider;
use crate::services::{CheckInLedger, OrderOrchestrator, PaymentReconciler};
use crate::store::Store;

/// Shared handler state: one instance of each core service.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderOrchestrator,
    pub payments: PaymentReconciler,
    pub checkin: CheckInLedger,
    pub pending_order_ttl: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn PaymentProvider>,
        return_url: impl Into<String>,
        pending_order_ttl: Duration,
    ) -> Self {
        Self {
            orders: OrderOrchestrator::new(store.clone(), clock.clone()),
            payments: PaymentReconciler::new(store.clone(), clock.clone(), provider, return_url),
            checkin: CheckInLedger::new(store, clock),
            pending_order_ttl,
        }
    }
}
