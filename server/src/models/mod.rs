pub mod event;
pub mod order;
pub mod promotion;
pub mod ticket;
pub mod transaction;
pub mod user;

pub use event::{Event, EventStatus};
pub use order::{CheckInStatus, Order, OrderItem, OrderStatus};
pub use promotion::{DiscountType, Promotion};
pub use ticket::TicketType;
pub use transaction::{PaymentMethod, PaymentStatus, PaymentTransaction};
pub use user::{Actor, UserRole};
