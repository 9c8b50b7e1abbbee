//! Shop Module
//! Mission: Product catalog and per-user orders behind the access gate

pub mod api;
pub mod models;
pub mod store;

pub use api::ShopState;
pub use models::{Order, OrderStatus, Product};
pub use store::{OrderError, ShopStore};
