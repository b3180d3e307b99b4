pub mod expiration;

pub use expiration::{ExpirationJob, ExpirationReport, ExpirationScheduler};
