use axum::extract::State;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::services::GuestRegistration;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};
use crate::AppState;
use super::extractor::{ValidJson, ValidPath};

pub async fn add_guest(
    State(state): State<AppState>,
    ValidPath(event_id): ValidPath<Uuid>,
    ValidJson(registration): ValidJson<GuestRegistration>,
) -> AppResult<Response> {
    state.guests.add_guest(event_id, registration).await?;
    Ok(created((), "Registration confirmed").into_response())
}

pub async fn list_guests(
    State(state): State<AppState>,
    ValidPath(event_id): ValidPath<Uuid>,
) -> AppResult<Response> {
    let guests = state.guests.list_guests(event_id).await?;
    Ok(success(guests, "Guests retrieved successfully").into_response())
}
