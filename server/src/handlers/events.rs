use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::services::{EventDraft, EventPatch};
use crate::uploads::ImageUpload;
use crate::utils::error::{AppError, AppResult};
use crate::utils::response::{created, empty_success, success};
use crate::AppState;
use super::extractor::{ValidPath, ValidQuery};

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsQuery {
    pub cursor: Option<Uuid>,
}

/// Fields of the create/edit event form. Everything is optional at this
/// stage; the service decides what is required.
#[derive(Debug, Default)]
struct EventForm {
    name: Option<String>,
    description: Option<String>,
    location: Option<String>,
    date: Option<DateTime<Utc>>,
    images: Vec<ImageUpload>,
}

impl EventForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = EventForm::default();

        while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await.map_err(invalid_form)?;
                    // Browsers send an empty part for an untouched file input.
                    if bytes.is_empty() && file_name.as_deref().unwrap_or("").is_empty() {
                        continue;
                    }
                    form.images.push(ImageUpload {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                "name" => form.name = Some(field.text().await.map_err(invalid_form)?),
                "description" => {
                    form.description = Some(field.text().await.map_err(invalid_form)?)
                }
                "location" => form.location = Some(field.text().await.map_err(invalid_form)?),
                "date" => {
                    let raw = field.text().await.map_err(invalid_form)?;
                    form.date = parse_date(&raw)?;
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

fn invalid_form(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::ValidationError(format!("Invalid form data: {}", err.body_text()))
}

fn parse_date(raw: &str) -> AppResult<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|date| Some(date.with_timezone(&Utc)))
        .map_err(|_| {
            AppError::ValidationError("Date must be an RFC 3339 timestamp".to_string())
        })
}

pub async fn create_event(
    State(state): State<AppState>,
    ValidPath(organization_id): ValidPath<Uuid>,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = EventForm::read(multipart).await?;
    let draft = EventDraft {
        name: form.name.unwrap_or_default(),
        description: form.description.unwrap_or_default(),
        location: form.location,
        date: form.date,
        images: form.images,
    };

    let id = state.events.create_event(organization_id, draft).await?;
    Ok(created(json!({ "id": id }), "Event created successfully").into_response())
}

pub async fn update_event(
    State(state): State<AppState>,
    ValidPath(event_id): ValidPath<Uuid>,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = EventForm::read(multipart).await?;
    let patch = EventPatch {
        name: form.name,
        description: form.description,
        location: form.location,
        date: form.date,
        images: form.images,
    };

    state.events.update_event(event_id, patch).await?;
    Ok(empty_success("Event updated successfully").into_response())
}

pub async fn list_events(
    State(state): State<AppState>,
    ValidPath(organization_id): ValidPath<Uuid>,
    ValidQuery(query): ValidQuery<ListEventsQuery>,
) -> AppResult<Response> {
    let page = state
        .events
        .list_events(organization_id, query.cursor)
        .await?;
    Ok(success(page, "Events retrieved successfully").into_response())
}

pub async fn get_event(
    State(state): State<AppState>,
    ValidPath(event_id): ValidPath<Uuid>,
) -> AppResult<Response> {
    let event = state.events.get_event(event_id).await?;
    Ok(success(event, "Event retrieved successfully").into_response())
}
