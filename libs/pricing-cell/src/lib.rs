pub mod engine;
pub mod models;

pub use engine::{compute_price, quote_deposit};
pub use models::*;
