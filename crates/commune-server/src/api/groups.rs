use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use commune_shared::types::GroupId;
use commune_store::Group;

use super::{json_body, parse_id, AppState};
use crate::auth::AuthUser;
use crate::error::{OrNotFound, ServerError};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_group))
        .route("/all", get(all_groups))
        .route("/my", get(my_groups))
        .route("/join/:id", post(join_group))
        .route("/:id", get(get_group))
}

#[derive(Deserialize)]
struct CreateGroupRequest {
    #[serde(default)]
    name: String,
    description: Option<String>,
    image: Option<String>,
}

#[derive(Serialize)]
struct JoinResponse {
    message: &'static str,
    group: Group,
}

async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Group>), ServerError> {
    let req = json_body(body)?;
    let group = state.db.lock().await.create_group(
        auth.id,
        &req.name,
        req.description.as_deref(),
        req.image.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn all_groups(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<Group>>, ServerError> {
    Ok(Json(state.db.lock().await.list_groups()?))
}

async fn my_groups(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Group>>, ServerError> {
    Ok(Json(state.db.lock().await.list_groups_for_member(auth.id)?))
}

async fn get_group(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Group>, ServerError> {
    let id: GroupId = parse_id(&id)?;
    let group = state.db.lock().await.get_group(id).or_not_found("Group not found")?;
    Ok(Json(group))
}

async fn join_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JoinResponse>, ServerError> {
    let id: GroupId = parse_id(&id)?;
    let group = state.db.lock().await.join_group(id, auth.id)?;
    Ok(Json(JoinResponse {
        message: "Joined group successfully",
        group,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::TestApp;
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn create_join_and_list() {
        let app = TestApp::new().await;
        let alice = app.user("Alice").await;
        let bob = app.user("Bob").await;

        let (status, group) = app
            .request(
                Method::POST,
                "/api/group/create",
                Some(&alice.token),
                Some(json!({ "name": "Hikers", "description": "weekend trips" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = group["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .request(Method::POST, &format!("/api/group/join/{id}"), Some(&bob.token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["group"]["members"].as_array().unwrap().len(), 2);

        let (status, body) = app
            .request(Method::POST, &format!("/api/group/join/{id}"), Some(&bob.token), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "You are already a member of this group");

        let (_, body) = app.request(Method::GET, "/api/group/my", Some(&bob.token), None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = app
            .request(Method::GET, &format!("/api/group/{id}"), Some(&bob.token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Hikers");
    }

    #[tokio::test]
    async fn duplicate_name_and_missing_group() {
        let app = TestApp::new().await;
        let alice = app.user("Alice").await;

        for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
            let (status, _) = app
                .request(
                    Method::POST,
                    "/api/group/create",
                    Some(&alice.token),
                    Some(json!({ "name": "Hikers" })),
                )
                .await;
            assert_eq!(status, expected);
        }

        let (status, body) = app
            .request(Method::POST, "/api/group/create", Some(&alice.token), Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Group name is required");

        let missing = GroupId::new();
        let (status, body) = app
            .request(Method::GET, &format!("/api/group/{missing}"), Some(&alice.token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Group not found");
    }
}
