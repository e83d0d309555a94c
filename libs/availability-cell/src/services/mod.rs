pub mod availability;
pub mod cache;
pub mod fallback;
