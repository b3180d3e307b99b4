//! Access layer between the HTTP handlers and the store.

pub mod events;
pub mod guests;
pub mod organizations;

pub use events::{EventDraft, EventPatch, EventService};
pub use guests::{GuestRegistration, GuestService};
pub use organizations::{OrganizationInit, OrganizationService, UserRegistration};
