use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BatchWrite, CommitReport, EventStore, StoreError, StoreResult, WriteBatch};
use crate::models::{
    Event, EventChanges, EventStatus, ExpiredEvent, Guest, NewEvent, Organization, User,
};

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    organizations: HashMap<Uuid, Organization>,
    guests: Vec<Guest>,
    users: HashMap<Uuid, User>,
}

fn adjust_counter(tables: &mut Tables, organization_id: Uuid, delta: i32) -> bool {
    match tables.organizations.get_mut(&organization_id) {
        Some(org) => {
            org.active_events_count = (org.active_events_count + delta).max(0);
            org.updated_at = Utc::now();
            true
        }
        None => false,
    }
}

/// In-process store with the same observable semantics as the Postgres one.
///
/// Every operation takes the single table lock, so a batch commit is atomic
/// with respect to every other call.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an event in place as-is, bypassing counters. Meant for seeding
    /// fixtures with exact timestamps and statuses.
    pub async fn put_event(&self, event: Event) {
        self.tables.write().await.events.insert(event.id, event);
    }

    /// Put an organization in place as-is, overwriting any existing one.
    pub async fn put_organization(&self, organization: Organization) {
        self.tables
            .write()
            .await
            .organizations
            .insert(organization.id, organization);
    }

    pub async fn remove_organization(&self, id: Uuid) -> Option<Organization> {
        self.tables.write().await.organizations.remove(&id)
    }

    pub async fn organization_count(&self) -> usize {
        self.tables.read().await.organizations.len()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn fetch_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut tables = self.tables.write().await;

        if tables.events.contains_key(&event.id) {
            return Err(StoreError::AlreadyExists);
        }
        if !adjust_counter(&mut tables, event.organization_id, 1) {
            return Err(StoreError::FailedPrecondition(format!(
                "organization {} does not exist",
                event.organization_id
            )));
        }

        let event = event.into_event();
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn update_event(
        &self,
        id: Uuid,
        changes: EventChanges,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Event>> {
        let mut tables = self.tables.write().await;

        Ok(tables.events.get_mut(&id).map(|event| {
            changes.apply(event, at);
            event.clone()
        }))
    }

    async fn list_active_events(
        &self,
        organization_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read().await;

        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| e.organization_id == organization_id)
            .filter(|e| e.status == EventStatus::Active)
            .filter(|e| before.map_or(true, |before| e.created_at < before))
            .cloned()
            .collect();

        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(events)
    }

    async fn event_created_at(&self, id: Uuid) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.tables.read().await.events.get(&id).map(|e| e.created_at))
    }

    async fn find_expired_events(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ExpiredEvent>> {
        let tables = self.tables.read().await;

        let mut expired: Vec<&Event> = tables
            .events
            .values()
            .filter(|e| e.status == EventStatus::Active && e.date < now)
            .collect();

        expired.sort_by(|a, b| a.date.cmp(&b.date));

        Ok(expired
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|e| ExpiredEvent {
                id: e.id,
                organization_id: e.organization_id,
            })
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReport> {
        let mut tables = self.tables.write().await;

        // Validate everything first so a failing write leaves no trace.
        for write in batch.writes() {
            if let BatchWrite::FinishEvent { event_id, .. } = write {
                let active = tables
                    .events
                    .get(event_id)
                    .map_or(false, |e| e.status == EventStatus::Active);
                if !active {
                    return Err(StoreError::Conflict(format!(
                        "event {} is no longer active",
                        event_id
                    )));
                }
            }
        }

        let mut report = CommitReport::default();
        for write in batch.writes() {
            match *write {
                BatchWrite::FinishEvent { event_id, at } => {
                    if let Some(event) = tables.events.get_mut(&event_id) {
                        event.status = EventStatus::Finished;
                        event.updated_at = at;
                    }
                }
                BatchWrite::AdjustActiveEvents {
                    organization_id,
                    delta,
                } => {
                    if !adjust_counter(&mut tables, organization_id, delta) {
                        report.missing_organizations.push(organization_id);
                        continue;
                    }
                }
            }
            report.writes_applied += 1;
        }

        Ok(report)
    }

    async fn adjust_active_events(&self, organization_id: Uuid, delta: i32) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(adjust_counter(&mut tables, organization_id, delta))
    }

    async fn fetch_organization(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(self.tables.read().await.organizations.get(&id).cloned())
    }

    async fn insert_organization(&self, organization: Organization) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;

        if tables.organizations.contains_key(&organization.id) {
            return Ok(false);
        }
        tables.organizations.insert(organization.id, organization);
        Ok(true)
    }

    async fn find_guest(&self, event_id: Uuid, email: &str) -> StoreResult<Option<Guest>> {
        Ok(self
            .tables
            .read()
            .await
            .guests
            .iter()
            .find(|g| g.event_id == event_id && g.email == email)
            .cloned())
    }

    async fn insert_guest(&self, guest: Guest) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        if tables
            .guests
            .iter()
            .any(|g| g.event_id == guest.event_id && g.email == guest.email)
        {
            return Err(StoreError::AlreadyExists);
        }

        let event = tables.events.get_mut(&guest.event_id).ok_or_else(|| {
            StoreError::FailedPrecondition(format!("event {} does not exist", guest.event_id))
        })?;
        event.guest_count += 1;

        tables.guests.push(guest);
        Ok(())
    }

    async fn list_guests(&self, event_id: Uuid) -> StoreResult<Vec<Guest>> {
        let tables = self.tables.read().await;

        let mut guests: Vec<Guest> = tables
            .guests
            .iter()
            .filter(|g| g.event_id == event_id)
            .cloned()
            .collect();

        guests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(guests)
    }

    async fn fetch_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn insert_user(
        &self,
        user: User,
        owned_organization: Option<Organization>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        let taken = tables.users.contains_key(&user.id)
            || tables.users.values().any(|u| u.email == user.email);
        if taken {
            return Err(StoreError::AlreadyExists);
        }
        if let Some(org) = &owned_organization {
            if tables.organizations.contains_key(&org.id) {
                return Err(StoreError::AlreadyExists);
            }
        }
        if let Some(org_id) = user.organization_id {
            let staged = owned_organization.as_ref().map_or(false, |o| o.id == org_id);
            if !staged && !tables.organizations.contains_key(&org_id) {
                return Err(StoreError::FailedPrecondition(format!(
                    "organization {} does not exist",
                    org_id
                )));
            }
        }

        if let Some(org) = owned_organization {
            tables.organizations.insert(org.id, org);
        }
        tables.users.insert(user.id, user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn organization(active: i32) -> Organization {
        let mut org = Organization::new(Uuid::new_v4(), "Acme".into(), Uuid::new_v4(), Utc::now());
        org.active_events_count = active;
        org
    }

    fn active_event(org_id: Uuid, date: DateTime<Utc>) -> Event {
        NewEvent {
            id: Uuid::new_v4(),
            name: "Event".into(),
            description: "An event description".into(),
            location: "Somewhere".into(),
            date,
            image_url: "img.png".into(),
            organization_id: org_id,
            created_at: Utc::now(),
        }
        .into_event()
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = MemoryEventStore::new();
        let org = organization(2);
        let past = Utc::now() - Duration::days(1);

        let active = active_event(org.id, past);
        let mut finished = active_event(org.id, past);
        finished.status = EventStatus::Finished;

        store.put_organization(org.clone()).await;
        store.put_event(active.clone()).await;
        store.put_event(finished.clone()).await;

        let mut batch = WriteBatch::new();
        batch
            .finish_event(active.id, Utc::now())
            .adjust_active_events(org.id, -1)
            .finish_event(finished.id, Utc::now())
            .adjust_active_events(org.id, -1);

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let untouched = store.fetch_event(active.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, EventStatus::Active);
        let org_after = store.fetch_organization(org.id).await.unwrap().unwrap();
        assert_eq!(org_after.active_events_count, 2);
    }

    #[tokio::test]
    async fn test_counter_is_clamped_at_zero() {
        let store = MemoryEventStore::new();
        let org = organization(0);
        store.put_organization(org.clone()).await;

        assert!(store.adjust_active_events(org.id, -1).await.unwrap());
        let org_after = store.fetch_organization(org.id).await.unwrap().unwrap();
        assert_eq!(org_after.active_events_count, 0);

        assert!(!store.adjust_active_events(Uuid::new_v4(), 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_skips_missing_organization() {
        let store = MemoryEventStore::new();
        let orphan_org = Uuid::new_v4();
        let event = active_event(orphan_org, Utc::now() - Duration::hours(2));
        store.put_event(event.clone()).await;

        let mut batch = WriteBatch::new();
        batch
            .finish_event(event.id, Utc::now())
            .adjust_active_events(orphan_org, -1);

        let report = store.commit(batch).await.unwrap();
        assert_eq!(report.writes_applied, 1);
        assert_eq!(report.missing_organizations, vec![orphan_org]);

        let stored = store.fetch_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Finished);
    }

    #[tokio::test]
    async fn test_insert_guest_enforces_unique_email_per_event() {
        let store = MemoryEventStore::new();
        let org = organization(0);
        let event = active_event(org.id, Utc::now() + Duration::days(3));
        store.put_event(event.clone()).await;

        let guest = |email: &str| Guest {
            id: Uuid::new_v4(),
            event_id: event.id,
            name: "Ana".into(),
            email: email.into(),
            created_at: Utc::now(),
        };

        store.insert_guest(guest("ana@example.com")).await.unwrap();
        assert_eq!(
            store.insert_guest(guest("ana@example.com")).await,
            Err(StoreError::AlreadyExists)
        );

        let stored = store.fetch_event(event.id).await.unwrap().unwrap();
        assert_eq!(stored.guest_count, 1);
    }
}
