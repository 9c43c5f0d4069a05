pub mod balance;
pub mod health;
pub mod orders;

pub use balance::{get_balance, list_withdrawals, withdraw};
pub use health::health_check;
pub use orders::{list_orders, upload_order};
