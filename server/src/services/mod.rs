pub mod checkin;
pub mod codes;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod promotions;

pub use checkin::CheckInLedger;
pub use orders::{CreateOrder, OrderDetails, OrderOrchestrator, TicketRequest};
pub use payments::{CallbackOutcome, PaymentReconciler, RefundRequest};

use tracing::error;

use crate::store::UnitOfWork;
use crate::utils::error::AppError;

/// Commits on success; on failure rolls back every write the unit made and
/// returns the original error.
pub(crate) async fn finish<T>(
    uow: &mut dyn UnitOfWork,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                error!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
