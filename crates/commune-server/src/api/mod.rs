//! HTTP surface: router, shared state, and the small helpers every route
//! module leans on.

mod events;
mod groups;
mod messages;
mod statuses;
mod users;

pub(crate) use statuses::purge_expired;

use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use commune_store::Database;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::media::MediaStore;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomTracker;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub media: Arc<MediaStore>,
    pub registry: ConnectionRegistry,
    pub rooms: RoomTracker,
    pub dispatcher: Dispatcher,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Database, media: MediaStore, config: ServerConfig) -> Self {
        let db = Arc::new(Mutex::new(db));
        let registry = ConnectionRegistry::new();
        let rooms = RoomTracker::new();
        let dispatcher = Dispatcher::new(db.clone(), registry.clone(), rooms.clone());

        Self {
            db,
            media: Arc::new(media),
            registry,
            rooms,
            dispatcher,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    // Multipart framing on top of the largest accepted upload.
    let body_limit = state.config.max_media_size + 1024 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/media/:id", get(media_download))
        .route("/ws", get(ws::ws_handler))
        .nest("/api/user", users::routes())
        .nest("/api/group", groups::routes())
        .nest("/api/message", messages::routes())
        .nest("/api/event", events::routes())
        .nest("/api/status", statuses::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// `{ "message": ... }` acknowledgement body.
#[derive(Serialize)]
pub(crate) struct Ack {
    message: &'static str,
}

pub(crate) fn ack(message: &'static str) -> Json<Ack> {
    Json(Ack { message })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn media_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let id = parse_id(&id)?;
    let (data, content_type) = state.media.get(id).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

/// Path ids are taken as strings so a malformed one gets the JSON error body.
pub(crate) fn parse_id<T: From<Uuid>>(raw: &str) -> Result<T, ServerError> {
    Uuid::parse_str(raw.trim())
        .map(T::from)
        .map_err(|_| ServerError::bad_request("Invalid id"))
}

pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    body.map(|Json(value)| value)
        .map_err(|e| ServerError::bad_request(e.body_text()))
}

pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ServerError> {
    query
        .map(|Query(value)| value)
        .map_err(|e| ServerError::bad_request(e.body_text()))
}

pub(crate) fn multipart_body(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Multipart, ServerError> {
    multipart.map_err(|e| ServerError::bad_request(e.body_text()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use commune_shared::types::UserId;
    use commune_store::NewUser;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub(crate) struct TestApp {
        pub state: AppState,
        pub router: Router,
        _media_dir: TempDir,
    }

    pub(crate) struct TestUser {
        pub id: UserId,
        pub token: String,
    }

    impl TestApp {
        pub async fn new() -> Self {
            let media_dir = TempDir::new().unwrap();
            let config = ServerConfig {
                media_storage_path: media_dir.path().to_path_buf(),
                max_media_size: 1024 * 1024,
                ..ServerConfig::default()
            };
            let media = MediaStore::new(
                config.media_storage_path.clone(),
                config.public_base_url.clone(),
                config.max_media_size,
            )
            .await
            .unwrap();
            let state = AppState::new(Database::open_in_memory().unwrap(), media, config);
            Self {
                router: build_router(state.clone()),
                state,
                _media_dir: media_dir,
            }
        }

        /// Register a user straight in the store, skipping password hashing.
        pub async fn user(&self, name: &str) -> TestUser {
            let db = self.state.db.lock().await;
            let user = db
                .create_user(&NewUser {
                    fullname: name.into(),
                    email: format!("{}@example.com", name.to_lowercase()),
                    password_hash: "unused".into(),
                    profile_pic: String::new(),
                })
                .unwrap();
            let token = db.create_session(user.id).unwrap();
            TestUser { id: user.id, token }
        }

        pub async fn request(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(json) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.send(request).await
        }

        pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }
    }

    const BOUNDARY: &str = "commune-test-boundary";

    pub(crate) struct FilePart<'a> {
        pub field: &'a str,
        pub filename: &'a str,
        pub content_type: &'a str,
        pub data: &'a [u8],
    }

    /// A `multipart/form-data` POST with text fields and an optional file.
    pub(crate) fn multipart_request(
        uri: &str,
        token: Option<&str>,
        fields: &[(&str, &str)],
        file: Option<FilePart<'_>>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(file) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    file.field, file.filename, file.content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(file.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn health() {
        let app = TestApp::new().await;
        let (status, body) = app.request(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn missing_session_is_unauthenticated() {
        let app = TestApp::new().await;
        let (status, body) = app.request(Method::GET, "/api/group/all", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthenticated");

        let (status, _) = app
            .request(Method::GET, "/api/group/all", Some("bogus"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_id_is_bad_request() {
        let app = TestApp::new().await;
        let alice = app.user("Alice").await;
        let (status, body) = app
            .request(Method::GET, "/api/group/not-a-uuid", Some(&alice.token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid id");
    }

    #[tokio::test]
    async fn unknown_media_is_not_found() {
        let app = TestApp::new().await;
        let uri = format!("/media/{}", Uuid::new_v4());
        let (status, _) = app.request(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
