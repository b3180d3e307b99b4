pub mod event;
pub mod guest;
pub mod organization;
pub mod user;

pub use event::{Event, EventChanges, EventPage, EventStatus, ExpiredEvent, NewEvent};
pub use guest::Guest;
pub use organization::{DashboardStats, Organization};
pub use user::{Role, User};
