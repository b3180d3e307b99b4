use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::connectivity::ConnectionState;
use crate::utils::response::success;
use crate::AppState;

pub mod events;
pub mod extractor;
pub mod guests;
pub mod organizations;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    store: ConnectionState,
}

/// Reports the last state published by the connectivity monitor. Does not
/// ping the store itself.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let store = *state.connection.borrow();
    let payload = HealthPayload {
        status: if store.is_online() { "ok" } else { "degraded" },
        service: "guestlist-api",
        store,
    };

    success(payload, "Health check successful").into_response()
}
