use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::models::{EventStatus, Guest};
use crate::store::{EventStore, StoreError};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GuestRegistration {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email"))]
    pub email: String,
}

#[derive(Clone)]
pub struct GuestService {
    store: Arc<dyn EventStore>,
}

impl GuestService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Register a guest for an active event.
    ///
    /// The duplicate check runs before the insert; a concurrent registration
    /// with the same email that slips between the two is still rejected by
    /// the store's uniqueness constraint.
    pub async fn add_guest(
        &self,
        event_id: Uuid,
        registration: GuestRegistration,
    ) -> AppResult<()> {
        let registration = GuestRegistration {
            name: registration.name.trim().to_string(),
            email: registration.email.trim().to_string(),
        };
        registration.validate()?;

        let event = self
            .store
            .fetch_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event '{}' was not found", event_id)))?;

        if event.status != EventStatus::Active {
            return Err(AppError::Conflict(
                "This event is no longer accepting registrations".to_string(),
            ));
        }

        if self
            .store
            .find_guest(event_id, &registration.email)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateRegistration);
        }

        let guest = Guest {
            id: Uuid::new_v4(),
            event_id,
            name: registration.name,
            email: registration.email,
            created_at: Utc::now(),
        };

        match self.store.insert_guest(guest).await {
            Ok(()) => {
                info!(event_id = %event_id, "Guest registered");
                Ok(())
            }
            Err(StoreError::AlreadyExists) => {
                warn!(event_id = %event_id, "Concurrent duplicate registration caught by store");
                Err(AppError::DuplicateRegistration)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_guests(&self, event_id: Uuid) -> AppResult<Vec<Guest>> {
        if self.store.fetch_event(event_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Event '{}' was not found",
                event_id
            )));
        }

        Ok(self.store.list_guests(event_id).await?)
    }
}
