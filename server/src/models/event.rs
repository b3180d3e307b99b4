use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Finished,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Finished => "finished",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EventStatus::Active),
            "finished" => Ok(EventStatus::Finished),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(StoreError::DataLoss(format!("unknown event status '{}'", other))),
        }
    }
}

/// Event as handed to callers of the access layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub image_url: String,
    pub organization_id: Uuid,
    pub status: EventStatus,
    pub guest_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of the `events` table.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub image_url: String,
    pub organization_id: Uuid,
    pub status: String,
    pub guest_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            name: row.name,
            description: row.description,
            location: row.location,
            date: row.date,
            image_url: row.image_url,
            organization_id: row.organization_id,
            status: row.status.parse()?,
            guest_count: row.guest_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fully resolved event ready for insertion; the image is already uploaded.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub image_url: String,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn into_event(self) -> Event {
        Event {
            id: self.id,
            name: self.name,
            description: self.description,
            location: self.location,
            date: self.date,
            image_url: self.image_url,
            organization_id: self.organization_id,
            status: EventStatus::Active,
            guest_count: 0,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.date.is_none()
            && self.image_url.is_none()
    }

    pub fn apply(self, event: &mut Event, at: DateTime<Utc>) {
        if let Some(name) = self.name {
            event.name = name;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(image_url) = self.image_url {
            event.image_url = image_url;
        }
        event.updated_at = at;
    }
}

/// One page of an organization's active events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub events: Vec<Event>,
    pub next_cursor: Option<Uuid>,
}

/// Minimal projection of an event selected for expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ExpiredEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
}
