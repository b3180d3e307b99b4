pub mod config;
pub mod connectivity;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod uploads;
pub mod utils;

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::connectivity::ConnectionState;
use crate::services::{EventService, GuestService, OrganizationService};
use crate::store::EventStore;
use crate::uploads::ImageStorage;

/// Shared handler state. Cloned per request, so everything inside is cheap
/// to clone.
#[derive(Clone)]
pub struct AppState {
    pub events: EventService,
    pub guests: GuestService,
    pub organizations: OrganizationService,
    pub connection: watch::Receiver<ConnectionState>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EventStore>,
        images: Arc<dyn ImageStorage>,
        connection: watch::Receiver<ConnectionState>,
        config: &Config,
    ) -> Self {
        Self {
            events: EventService::new(
                store.clone(),
                images,
                config.events_page_size,
                config.max_image_bytes,
            ),
            guests: GuestService::new(store.clone()),
            organizations: OrganizationService::new(store),
            connection,
        }
    }
}
