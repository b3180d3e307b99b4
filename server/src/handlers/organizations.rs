use axum::extract::State;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::services::{OrganizationInit, UserRegistration};
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};
use crate::AppState;
use super::extractor::{ValidJson, ValidPath};

pub async fn register_user(
    State(state): State<AppState>,
    ValidJson(registration): ValidJson<UserRegistration>,
) -> AppResult<Response> {
    let user = state.organizations.register_user(registration).await?;
    Ok(created(user, "User registered successfully").into_response())
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> Response {
    let stats = state.organizations.dashboard_stats(user_id).await;
    success(stats, "Dashboard stats retrieved successfully").into_response()
}

pub async fn get_organization(
    State(state): State<AppState>,
    ValidPath(organization_id): ValidPath<Uuid>,
) -> AppResult<Response> {
    let organization = state
        .organizations
        .get_organization(organization_id)
        .await?;
    Ok(success(organization, "Organization retrieved successfully").into_response())
}

pub async fn initialize_organization(
    State(state): State<AppState>,
    ValidPath(organization_id): ValidPath<Uuid>,
    ValidJson(init): ValidJson<OrganizationInit>,
) -> AppResult<Response> {
    let organization = state
        .organizations
        .initialize_organization(organization_id, init)
        .await?;
    Ok(success(organization, "Organization ready").into_response())
}
