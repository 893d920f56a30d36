pub mod notifications;
pub mod payments;
