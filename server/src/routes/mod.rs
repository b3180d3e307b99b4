use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{events, guests, health_check, organizations};
use crate::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/users", post(organizations::register_user))
        .route("/users/:id/dashboard", get(organizations::dashboard_stats))
        .route(
            "/organizations/:id",
            get(organizations::get_organization).put(organizations::initialize_organization),
        )
        .route(
            "/organizations/:id/events",
            get(events::list_events).post(events::create_event),
        )
        .route(
            "/events/:id",
            get(events::get_event).patch(events::update_event),
        )
        .route(
            "/events/:id/guests",
            get(guests::list_guests).post(guests::add_guest),
        )
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(DefaultBodyLimit::max(config.body_limit()))
        .with_state(state);

    create_security_headers_layer()
        .apply(api)
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(&config.cors_allowed_origins))
}
