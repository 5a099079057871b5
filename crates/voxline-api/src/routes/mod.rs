pub mod messages;
pub mod users;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    response::IntoResponse,
    routing::{get, post},
};

use crate::state::AppState;

/// All endpoints, with uploads to `/messages/send` capped at `max_upload_bytes`.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let user_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/{id}", get(users::get_user))
        .route("/users/username/{username}", get(users::get_user_by_username));

    let message_routes = Router::new()
        .route(
            "/messages/send",
            post(messages::send_message).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/messages/conversation/{user1_id}/{user2_id}",
            get(messages::get_conversation),
        )
        .route("/messages/download", get(messages::download));

    Router::new()
        .merge(user_routes)
        .merge(message_routes)
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
