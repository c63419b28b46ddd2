//! Domain values shared by the checkout services, the stores and the HTTP layer.

pub mod cart;
pub mod coupon;
pub mod order;

pub use cart::CartLine;
pub use coupon::Coupon;
pub use order::{NewOrder, Order, OrderLine};
