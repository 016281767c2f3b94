pub mod cart;
pub mod cart_item;
pub mod category;
pub mod customer;
pub mod flower;
pub mod notification_job;
pub mod order;
pub mod order_item;

pub use order::{OrderStatus, PaymentMethod, PaymentStatus};
pub use notification_job::{JobStatus, NotificationKind};
