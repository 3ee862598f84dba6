use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use commune_shared::protocol::ChatMessage;
use commune_shared::types::MessageTarget;

use super::{json_body, parse_id, query_params, AppState};
use crate::auth::AuthUser;
use crate::error::ServerError;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/send/:id", post(send_message))
        .route("/get/:id", get(get_messages))
}

/// `?isGroup=true` switches the path id from a user to a group. Any other
/// value, or none, addresses a user.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetQuery {
    #[serde(default)]
    is_group: Option<String>,
}

impl TargetQuery {
    fn resolve(&self, raw_id: &str) -> Result<MessageTarget, ServerError> {
        let id: Uuid = parse_id(raw_id)?;
        let is_group = self.is_group.as_deref() == Some("true");
        Ok(MessageTarget::from_flag(id, is_group))
    }
}

#[derive(Deserialize)]
struct SendRequest {
    #[serde(default)]
    message: String,
}

async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    query: Result<Query<TargetQuery>, QueryRejection>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChatMessage>), ServerError> {
    let target = query_params(query)?.resolve(&id)?;
    let req = json_body(body)?;
    let message = state.dispatcher.send(auth.id, target, &req.message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    query: Result<Query<TargetQuery>, QueryRejection>,
) -> Result<Json<Vec<ChatMessage>>, ServerError> {
    let target = query_params(query)?.resolve(&id)?;
    Ok(Json(state.dispatcher.fetch(auth.id, target).await?))
}
