use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Event, EventChanges, EventPage, NewEvent};
use crate::store::EventStore;
use crate::uploads::{ImageStorage, ImageUpload};
use crate::utils::error::{AppError, AppResult};

/// Input for creating an event, as collected from the create form.
#[derive(Debug, Clone, Default, Validate)]
pub struct EventDraft {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: String,

    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: String,

    pub location: Option<String>,

    #[validate(required(message = "The event date is required"))]
    pub date: Option<DateTime<Utc>>,

    pub images: Vec<ImageUpload>,
}

/// Partial edit of an event. Absent fields stay as they are.
#[derive(Debug, Clone, Default, Validate)]
pub struct EventPatch {
    #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: Option<String>,

    pub location: Option<String>,

    pub date: Option<DateTime<Utc>>,

    pub images: Vec<ImageUpload>,
}

fn trimmed(value: String) -> String {
    value.trim().to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(trimmed).filter(|v| !v.is_empty())
}

/// Exactly-one-image rule shared by create and update.
fn single_image(mut images: Vec<ImageUpload>) -> AppResult<Option<ImageUpload>> {
    if images.len() > 1 {
        return Err(AppError::ValidationError(
            "Select only one image".to_string(),
        ));
    }
    Ok(images.pop())
}

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
    images: Arc<dyn ImageStorage>,
    page_size: i64,
    max_image_bytes: usize,
}

impl EventService {
    pub fn new(
        store: Arc<dyn EventStore>,
        images: Arc<dyn ImageStorage>,
        page_size: i64,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            store,
            images,
            page_size,
            max_image_bytes,
        }
    }

    /// Validate the draft, upload its image, then insert the event as active
    /// and bump the organization's active-event counter.
    ///
    /// The date is not compared with the current time; a past event is
    /// accepted and picked up by the next expiration run. If the insert fails
    /// after the upload, the uploaded image is left behind.
    pub async fn create_event(&self, organization_id: Uuid, draft: EventDraft) -> AppResult<Uuid> {
        if organization_id.is_nil() {
            return Err(AppError::ValidationError(
                "Organization id is required".to_string(),
            ));
        }

        let draft = EventDraft {
            name: trimmed(draft.name),
            description: trimmed(draft.description),
            location: non_empty(draft.location),
            ..draft
        };
        draft.validate()?;

        let date = draft
            .date
            .ok_or_else(|| AppError::ValidationError("The event date is required".to_string()))?;
        let image = single_image(draft.images)?
            .ok_or_else(|| AppError::ValidationError("An image is required".to_string()))?;
        image.check(self.max_image_bytes)?;

        if self.store.fetch_organization(organization_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Organization '{}' was not found",
                organization_id
            )));
        }

        let image_url = self.images.upload(image).await?;

        let event = self
            .store
            .insert_event(NewEvent {
                id: Uuid::new_v4(),
                name: draft.name,
                description: draft.description,
                location: draft
                    .location
                    .unwrap_or_else(|| organization_id.to_string()),
                date,
                image_url,
                organization_id,
                created_at: Utc::now(),
            })
            .await?;

        info!(event_id = %event.id, organization_id = %organization_id, "Event created");
        Ok(event.id)
    }

    pub async fn update_event(&self, event_id: Uuid, patch: EventPatch) -> AppResult<()> {
        let patch = EventPatch {
            name: patch.name.map(trimmed),
            description: patch.description.map(trimmed),
            location: non_empty(patch.location),
            ..patch
        };
        patch.validate()?;

        let image = single_image(patch.images)?;
        if let Some(image) = &image {
            image.check(self.max_image_bytes)?;
        }

        let mut changes = EventChanges {
            name: patch.name,
            description: patch.description,
            location: patch.location,
            date: patch.date,
            image_url: None,
        };

        if changes.is_empty() && image.is_none() {
            return match self.store.fetch_event(event_id).await? {
                Some(_) => Ok(()),
                None => Err(event_not_found(event_id)),
            };
        }

        // Old images are not deleted.
        if let Some(image) = image {
            changes.image_url = Some(self.images.upload(image).await?);
        }

        match self.store.update_event(event_id, changes, Utc::now()).await? {
            Some(_) => {
                info!(event_id = %event_id, "Event updated");
                Ok(())
            }
            None => Err(event_not_found(event_id)),
        }
    }

    /// One page of the organization's active events, newest first.
    ///
    /// `cursor` is the id of the last event of the previous page. An unknown
    /// cursor is ignored and the first page is returned.
    pub async fn list_events(
        &self,
        organization_id: Uuid,
        cursor: Option<Uuid>,
    ) -> AppResult<EventPage> {
        if organization_id.is_nil() {
            return Err(AppError::ValidationError(
                "Organization id is required".to_string(),
            ));
        }

        let before = match cursor {
            Some(cursor) => {
                let created_at = self.store.event_created_at(cursor).await?;
                if created_at.is_none() {
                    debug!(cursor = %cursor, "Ignoring unknown pagination cursor");
                }
                created_at
            }
            None => None,
        };

        // One extra row tells whether another page exists.
        let mut events = self
            .store
            .list_active_events(organization_id, before, self.page_size + 1)
            .await?;

        let page_size = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        let has_more = events.len() > page_size;
        events.truncate(page_size);

        let next_cursor = if has_more {
            events.last().map(|e| e.id)
        } else {
            None
        };

        Ok(EventPage {
            events,
            next_cursor,
        })
    }

    pub async fn get_event(&self, event_id: Uuid) -> AppResult<Event> {
        self.store
            .fetch_event(event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))
    }
}

fn event_not_found(event_id: Uuid) -> AppError {
    AppError::NotFound(format!("Event '{}' was not found", event_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, Organization};
    use crate::store::MemoryEventStore;
    use crate::uploads::{MockImageStorage, UploadError};
    use axum::body::Bytes;
    use chrono::Duration;

    fn png() -> ImageUpload {
        ImageUpload {
            file_name: Some("cover.png".to_string()),
            content_type: "image/png".to_string(),
            bytes: Bytes::from_static(b"\x89PNG"),
        }
    }

    fn draft(date: DateTime<Utc>) -> EventDraft {
        EventDraft {
            name: "Summer Show".to_string(),
            description: "The best bands in town, all night long".to_string(),
            location: None,
            date: Some(date),
            images: vec![png()],
        }
    }

    fn uploader() -> MockImageStorage {
        let mut images = MockImageStorage::new();
        images
            .expect_upload()
            .returning(|_| Ok("http://cdn.test/events/cover.png".to_string()));
        images
    }

    async fn setup(images: MockImageStorage) -> (EventService, MemoryEventStore, Organization) {
        let store = MemoryEventStore::new();
        let org = Organization::new(Uuid::new_v4(), "Acme".into(), Uuid::new_v4(), Utc::now());
        store.put_organization(org.clone()).await;

        let service = EventService::new(Arc::new(store.clone()), Arc::new(images), 10, 1024);
        (service, store, org)
    }

    #[tokio::test]
    async fn test_create_event_inserts_active_and_bumps_counter() {
        let (service, store, org) = setup(uploader()).await;

        let id = service
            .create_event(org.id, draft(Utc::now() + Duration::days(7)))
            .await
            .unwrap();

        let event = store.fetch_event(id).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Active);
        assert_eq!(event.guest_count, 0);
        assert_eq!(event.image_url, "http://cdn.test/events/cover.png");
        assert_eq!(event.location, org.id.to_string());

        let org = store.fetch_organization(org.id).await.unwrap().unwrap();
        assert_eq!(org.active_events_count, 1);
    }

    #[tokio::test]
    async fn test_create_event_accepts_past_date() {
        let (service, store, org) = setup(uploader()).await;

        let id = service
            .create_event(org.id, draft(Utc::now() - Duration::days(1)))
            .await
            .unwrap();

        let expired = store
            .find_expired_events(Utc::now(), 10)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, id);
    }

    #[tokio::test]
    async fn test_create_event_validates_before_touching_storage() {
        let mut images = MockImageStorage::new();
        images.expect_upload().never();
        let (service, _store, org) = setup(images).await;

        let mut short_name = draft(Utc::now());
        short_name.name = "ab".to_string();
        assert!(matches!(
            service.create_event(org.id, short_name).await,
            Err(AppError::InvalidInput(_))
        ));

        let mut no_image = draft(Utc::now());
        no_image.images.clear();
        assert!(matches!(
            service.create_event(org.id, no_image).await,
            Err(AppError::ValidationError(_))
        ));

        let mut two_images = draft(Utc::now());
        two_images.images.push(png());
        assert!(matches!(
            service.create_event(org.id, two_images).await,
            Err(AppError::ValidationError(_))
        ));

        let mut no_date = draft(Utc::now());
        no_date.date = None;
        assert!(matches!(
            service.create_event(org.id, no_date).await,
            Err(AppError::InvalidInput(_))
        ));

        assert!(matches!(
            service.create_event(Uuid::nil(), draft(Utc::now())).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_create_event_for_unknown_organization() {
        let (service, _store, _org) = setup(uploader()).await;

        assert!(matches!(
            service.create_event(Uuid::new_v4(), draft(Utc::now())).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_create() {
        let mut images = MockImageStorage::new();
        images.expect_upload().returning(|_| {
            Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        });
        let (service, store, org) = setup(images).await;

        assert!(matches!(
            service.create_event(org.id, draft(Utc::now())).await,
            Err(AppError::UploadError(_))
        ));
        let org = store.fetch_organization(org.id).await.unwrap().unwrap();
        assert_eq!(org.active_events_count, 0);
    }

    #[tokio::test]
    async fn test_update_event_changes_only_given_fields() {
        let (service, store, org) = setup(uploader()).await;
        let id = service
            .create_event(org.id, draft(Utc::now() + Duration::days(2)))
            .await
            .unwrap();
        let before = store.fetch_event(id).await.unwrap().unwrap();

        service
            .update_event(
                id,
                EventPatch {
                    name: Some("Winter Show".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let after = store.fetch_event(id).await.unwrap().unwrap();
        assert_eq!(after.name, "Winter Show");
        assert_eq!(after.description, before.description);
        assert_eq!(after.date, before.date);
        assert_eq!(after.image_url, before.image_url);
    }

    #[tokio::test]
    async fn test_update_event_replaces_image_url() {
        let mut images = MockImageStorage::new();
        let mut calls = 0;
        images.expect_upload().times(2).returning(move |_| {
            calls += 1;
            Ok(format!("http://cdn.test/events/{}.png", calls))
        });
        let (service, store, org) = setup(images).await;
        let id = service
            .create_event(org.id, draft(Utc::now()))
            .await
            .unwrap();

        service
            .update_event(
                id,
                EventPatch {
                    images: vec![png()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let event = store.fetch_event(id).await.unwrap().unwrap();
        assert_eq!(event.image_url, "http://cdn.test/events/2.png");
    }

    #[tokio::test]
    async fn test_update_unknown_event_is_not_found() {
        let (service, _store, _org) = setup(uploader()).await;

        let patch = EventPatch {
            description: Some("A perfectly long description".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_event(Uuid::new_v4(), patch).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service
                .update_event(Uuid::new_v4(), EventPatch::default())
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_events_paginates_newest_first() {
        let (service, store, org) = setup(uploader()).await;
        let base = Utc::now() - Duration::hours(1);

        for i in 0..15 {
            store
                .put_event(
                    NewEvent {
                        id: Uuid::new_v4(),
                        name: format!("Event {}", i),
                        description: "Fifteen events in a row".to_string(),
                        location: "Hall".to_string(),
                        date: Utc::now() + Duration::days(30),
                        image_url: "img.png".to_string(),
                        organization_id: org.id,
                        created_at: base + Duration::seconds(i),
                    }
                    .into_event(),
                )
                .await;
        }

        let first = service.list_events(org.id, None).await.unwrap();
        assert_eq!(first.events.len(), 10);
        assert_eq!(first.events[0].name, "Event 14");
        assert!(first
            .events
            .windows(2)
            .all(|w| w[0].created_at > w[1].created_at));
        let cursor = first.next_cursor.expect("first page should have a cursor");
        assert_eq!(cursor, first.events[9].id);

        let second = service.list_events(org.id, Some(cursor)).await.unwrap();
        assert_eq!(second.events.len(), 5);
        assert_eq!(second.events[0].name, "Event 4");
        assert_eq!(second.events[4].name, "Event 0");
        assert_eq!(second.next_cursor, None);
    }

    #[tokio::test]
    async fn test_list_events_skips_finished_and_ignores_unknown_cursor() {
        let (service, store, org) = setup(uploader()).await;

        let mut finished = NewEvent {
            id: Uuid::new_v4(),
            name: "Old".to_string(),
            description: "Already happened".to_string(),
            location: "Hall".to_string(),
            date: Utc::now() - Duration::days(3),
            image_url: "img.png".to_string(),
            organization_id: org.id,
            created_at: Utc::now(),
        }
        .into_event();
        finished.status = EventStatus::Finished;
        store.put_event(finished).await;

        let page = service
            .list_events(org.id, Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(page.events.is_empty());
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn test_get_event() {
        let (service, _store, org) = setup(uploader()).await;
        let id = service
            .create_event(org.id, draft(Utc::now()))
            .await
            .unwrap();

        assert_eq!(service.get_event(id).await.unwrap().id, id);
        assert!(matches!(
            service.get_event(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
