pub mod automation;
pub mod booking;
pub mod lifecycle;
pub mod reservation;
