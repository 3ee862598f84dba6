use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::info;

use commune_shared::join::{JoinDecision, JoinRequest, Resolution};
use commune_shared::types::{EventId, GroupId, UserId};
use commune_shared::DomainError;
use commune_store::{Event, NewEvent};

use super::{ack, json_body, parse_id, Ack, AppState};
use crate::auth::AuthUser;
use crate::error::ServerError;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_event))
        .route("/all", get(all_events))
        .route("/group/:group_id", get(group_events))
        .route("/delete/:id", delete(delete_event))
        .route("/request/:id", post(request_join))
        .route("/handle-request/:id", post(handle_request))
        .route("/requests/:id", get(pending_requests))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    date: String,
    location: Option<String>,
    #[serde(default)]
    group_id: String,
    #[serde(default)]
    limit: u32,
}

#[derive(Deserialize)]
struct JoinRequestBody {
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandleRequestBody {
    user_id: UserId,
    status: JoinDecision,
}

/// Accepts RFC 3339, an HTML `datetime-local` value, or a bare date
/// (midnight UTC).
fn parse_event_date(raw: &str) -> Result<DateTime<Utc>, ServerError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ServerError::bad_request("Invalid date"))
}

async fn create_event(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>), ServerError> {
    let req = json_body(body)?;
    if req.title.trim().is_empty() || req.date.trim().is_empty() || req.group_id.trim().is_empty()
    {
        return Err(ServerError::bad_request("Title, date, and group ID are required"));
    }
    let group_id: GroupId = parse_id(&req.group_id)?;
    let date = parse_event_date(&req.date)?;

    let event = state.db.lock().await.create_event(&NewEvent {
        group_id,
        title: req.title,
        description: req.description,
        date,
        location: req.location.filter(|l| !l.trim().is_empty()),
        limit: req.limit,
        created_by: auth.id,
    })?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn all_events(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<Event>>, ServerError> {
    Ok(Json(state.db.lock().await.list_events()?))
}

async fn group_events(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<Event>>, ServerError> {
    let group_id: GroupId = parse_id(&group_id)?;
    Ok(Json(state.db.lock().await.list_events_for_group(group_id)?))
}

async fn delete_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ServerError> {
    let id: EventId = parse_id(&id)?;
    state.db.lock().await.delete_event(id, auth.id)?;
    info!(event = %id, "Event deleted");
    Ok(ack("Event deleted"))
}

async fn request_join(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<JoinRequestBody>, JsonRejection>,
) -> Result<Json<Ack>, ServerError> {
    let id: EventId = parse_id(&id)?;
    let req = json_body(body)?;
    state.db.lock().await.request_join(id, auth.id, &req.reason)?;
    Ok(ack("Request sent"))
}

async fn handle_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<HandleRequestBody>, JsonRejection>,
) -> Result<Json<Event>, ServerError> {
    let id: EventId = parse_id(&id)?;
    let req = json_body(body)?;

    let (event, resolution) = state
        .db
        .lock()
        .await
        .handle_join_request(id, auth.id, req.user_id, req.status)?;

    match resolution {
        // The stale request is already gone; only the admin hears about it.
        Resolution::Full => Err(DomainError::conflict("Event is full").into()),
        Resolution::Admitted | Resolution::Rejected => Ok(Json(event)),
    }
}

async fn pending_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<JoinRequest>>, ServerError> {
    let id: EventId = parse_id(&id)?;
    let requests = state.db.lock().await.pending_requests(id, auth.id)?;
    Ok(Json(requests))
}
