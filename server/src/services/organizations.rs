use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::models::{DashboardStats, Organization, Role, User};
use crate::store::{EventStore, StoreError};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationInit {
    #[validate(length(min = 2, message = "Organization name must be at least 2 characters"))]
    pub name: String,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistration {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,

    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,

    pub role: Role,

    #[validate(length(min = 2, message = "Organization name must be at least 2 characters"))]
    pub organization_name: Option<String>,
}

#[derive(Clone)]
pub struct OrganizationService {
    store: Arc<dyn EventStore>,
}

impl OrganizationService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub async fn get_organization(&self, id: Uuid) -> AppResult<Organization> {
        if id.is_nil() {
            return Err(AppError::ValidationError(
                "Organization id is required".to_string(),
            ));
        }

        self.store
            .fetch_organization(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))
    }

    /// Create the organization with zeroed counters unless it already exists.
    /// Returns the stored organization either way.
    pub async fn initialize_organization(
        &self,
        id: Uuid,
        init: OrganizationInit,
    ) -> AppResult<Organization> {
        if id.is_nil() {
            return Err(AppError::ValidationError(
                "Organization id is required".to_string(),
            ));
        }
        let init = OrganizationInit {
            name: init.name.trim().to_string(),
            ..init
        };
        init.validate()?;

        let created = self
            .store
            .insert_organization(Organization::new(id, init.name, init.owner_id, Utc::now()))
            .await?;
        if created {
            info!(organization_id = %id, "Organization initialized");
        }

        self.get_organization(id).await
    }

    /// Register a user profile. Organizers get a new organization they own.
    pub async fn register_user(&self, registration: UserRegistration) -> AppResult<User> {
        let registration = UserRegistration {
            email: registration.email.trim().to_string(),
            name: registration.name.trim().to_string(),
            organization_name: registration
                .organization_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            ..registration
        };
        registration.validate()?;

        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let owned_organization = match registration.role {
            Role::Organizer => {
                let name = registration
                    .organization_name
                    .clone()
                    .unwrap_or_else(|| registration.name.clone());
                Some(Organization::new(Uuid::new_v4(), name, user_id, now))
            }
            Role::Promoter => None,
        };

        let user = User {
            id: user_id,
            email: registration.email,
            name: registration.name,
            role: registration.role,
            organization_id: owned_organization.as_ref().map(|o| o.id),
            created_at: now,
        };

        match self.store.insert_user(user.clone(), owned_organization).await {
            Ok(()) => {
                info!(user_id = %user.id, role = %user.role, "User registered");
                Ok(user)
            }
            Err(StoreError::AlreadyExists) => {
                Err(AppError::Conflict("This email is already in use".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Counters for the user's organization. Never fails: any problem along
    /// the way yields zeroed stats.
    pub async fn dashboard_stats(&self, user_id: Uuid) -> DashboardStats {
        match self.try_dashboard_stats(user_id).await {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                warn!(user_id = %user_id, "User has no organization, returning empty stats");
                DashboardStats::default()
            }
            Err(e) => {
                warn!(user_id = %user_id, error = ?e, "Failed to load dashboard stats");
                DashboardStats::default()
            }
        }
    }

    async fn try_dashboard_stats(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DashboardStats>, StoreError> {
        let organization_id = match self.store.fetch_user(user_id).await? {
            Some(User {
                organization_id: Some(id),
                ..
            }) => id,
            _ => return Ok(None),
        };

        Ok(self
            .store
            .fetch_organization(organization_id)
            .await?
            .as_ref()
            .map(DashboardStats::from))
    }
}
