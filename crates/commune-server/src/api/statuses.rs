use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use commune_shared::types::{GroupId, StatusId};
use commune_shared::DomainError;
use commune_store::{NewStatus, Status};

use super::{ack, multipart_body, parse_id, Ack, AppState};
use crate::auth::AuthUser;
use crate::error::{OrNotFound, ServerError};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_status))
        .route("/group/:group_id", get(group_statuses))
        .route("/view/:id", post(view_status))
        .route("/delete/:id", delete(delete_status))
}

#[derive(Default)]
struct UploadForm {
    file: Option<(bytes::Bytes, String)>,
    group_id: Option<String>,
    caption: String,
    music_track: String,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ServerError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::bad_request(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::bad_request(format!("Failed to read field: {e}")))?;
                form.file = Some((data, content_type));
            }
            "groupId" | "caption" | "musicTrack" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::bad_request(format!("Failed to read field: {e}")))?;
                match name.as_str() {
                    "groupId" => form.group_id = Some(text),
                    "caption" => form.caption = text,
                    _ => form.music_track = text,
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn upload_status(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Status>), ServerError> {
    let form = read_form(multipart_body(multipart)?).await?;
    let Some((data, content_type)) = form.file.filter(|(data, _)| !data.is_empty()) else {
        return Err(ServerError::bad_request("Media file is required"));
    };
    let group_id: GroupId = match form.group_id.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_id(raw)?,
        _ => return Err(ServerError::bad_request("Group ID is required")),
    };

    // Reject before writing anything to the media store.
    {
        let db = state.db.lock().await;
        let group = db.get_group(group_id).or_not_found("Group not found")?;
        if !group.is_member(&auth.id) {
            return Err(DomainError::unauthorized("You must be a member of the group").into());
        }
    }

    let media = state.media.store(&data, &content_type).await?;

    let created = state.db.lock().await.create_status(
        &NewStatus {
            user_id: auth.id,
            group_id,
            media_url: media.url.clone(),
            media_type: media.media_type,
            caption: form.caption.trim().to_string(),
            music_track: form.music_track.trim().to_string(),
        },
        Utc::now(),
    );

    match created {
        Ok(status) => {
            info!(status = %status.id, group = %group_id, media = %media.id, "Status uploaded");
            Ok((StatusCode::CREATED, Json(status)))
        }
        Err(e) => {
            if let Err(cleanup) = state.media.delete(media.id).await {
                warn!(media = %media.id, error = %cleanup, "Failed to remove orphaned media");
            }
            Err(e.into())
        }
    }
}

async fn group_statuses(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<Status>>, ServerError> {
    let group_id: GroupId = parse_id(&group_id)?;
    let statuses = state
        .db
        .lock()
        .await
        .list_statuses_for_group(group_id, Utc::now())?;
    Ok(Json(statuses))
}

async fn view_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ServerError> {
    let id: StatusId = parse_id(&id)?;
    state.db.lock().await.view_status(id, auth.id, Utc::now())?;
    Ok(ack("Status viewed"))
}

async fn delete_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ServerError> {
    let id: StatusId = parse_id(&id)?;
    let removed = state.db.lock().await.delete_status(id, auth.id)?;
    remove_media(&state, &removed.media_url).await;
    Ok(ack("Status deleted"))
}

/// Drop expired status rows along with the media they pointed at.
pub(crate) async fn purge_expired(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<usize, ServerError> {
    let media_urls = state.db.lock().await.purge_expired_statuses(now)?;
    for url in &media_urls {
        remove_media(state, url).await;
    }
    Ok(media_urls.len())
}

async fn remove_media(state: &AppState, url: &str) {
    let Some(media_id) = state.media.id_from_url(url) else {
        warn!(url, "Status media is not held by this server");
        return;
    };
    if let Err(e) = state.media.delete(media_id).await {
        warn!(media = %media_id, error = %e, "Failed to remove status media");
    }
}
