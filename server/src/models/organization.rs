use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub active_events_count: i32,
    pub total_promoters: i32,
    pub total_teams: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Fresh organization with all counters at zero.
    pub fn new(id: Uuid, name: String, owner_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            owner_id,
            active_events_count: 0,
            total_promoters: 0,
            total_teams: 0,
            created_at: at,
            updated_at: at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub active_events: i32,
    pub total_promoters: i32,
    pub total_teams: i32,
}

impl From<&Organization> for DashboardStats {
    fn from(org: &Organization) -> Self {
        Self {
            active_events: org.active_events_count.max(0),
            total_promoters: org.total_promoters.max(0),
            total_teams: org.total_teams.max(0),
        }
    }
}
