use axum::{
    extract::{rejection::JsonRejection, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use bytes::Bytes;
use tracing::{info, warn};

use commune_shared::constants::SESSION_COOKIE;
use commune_store::{NewUser, User};

use super::{ack, json_body, multipart_body, AppState};
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::ServerError;

/// Session cookie lifetime handed to browsers (30 days).
const COOKIE_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/allusers", get(all_users))
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupRequest {
    #[serde(default)]
    fullname: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm_password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    message: &'static str,
    user: User,
    token: String,
}

fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={COOKIE_MAX_AGE_SECS}")
}

fn default_avatar(fullname: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&background=random",
        urlencoding::encode(fullname)
    )
}

/// Signup fields plus an optional `profilePic` upload. JSON bodies never
/// carry a picture.
struct SignupForm {
    fields: SignupRequest,
    profile_pic: Option<(Bytes, String)>,
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

async fn read_signup(state: &AppState, req: Request) -> Result<SignupForm, ServerError> {
    if !is_multipart(&req) {
        let body = Json::<SignupRequest>::from_request(req, state).await;
        return Ok(SignupForm {
            fields: json_body(body)?,
            profile_pic: None,
        });
    }

    let mut multipart = multipart_body(Multipart::from_request(req, state).await)?;
    let mut form = SignupForm {
        fields: SignupRequest::default(),
        profile_pic: None,
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::bad_request(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "profilePic" {
            let content_type = field.content_type().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ServerError::bad_request(format!("Failed to read field: {e}")))?;
            if !data.is_empty() {
                form.profile_pic = Some((data, content_type));
            }
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ServerError::bad_request(format!("Failed to read field: {e}")))?;
        match name.as_str() {
            "fullname" => form.fields.fullname = text,
            "email" => form.fields.email = text,
            "password" => form.fields.password = text,
            "confirmPassword" => form.fields.confirm_password = text,
            _ => {}
        }
    }
    Ok(form)
}

async fn signup(
    State(state): State<AppState>,
    request: Request,
) -> Result<impl IntoResponse, ServerError> {
    let SignupForm {
        fields: req,
        profile_pic,
    } = read_signup(&state, request).await?;
    let fullname = req.fullname.trim().to_string();
    let email = req.email.trim().to_string();

    if fullname.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ServerError::bad_request("All fields are required"));
    }
    if req.password != req.confirm_password {
        return Err(ServerError::bad_request("Passwords do not match"));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("Hashing task failed: {e}")))??;

    // A failed upload fails the signup; no account is created without it.
    let uploaded = match profile_pic {
        Some((data, content_type)) => Some(state.media.store(&data, &content_type).await?),
        None => None,
    };
    let profile_pic = match &uploaded {
        Some(media) => media.url.clone(),
        None => default_avatar(&fullname),
    };

    let created = {
        let db = state.db.lock().await;
        db.create_user(&NewUser {
            fullname,
            email,
            password_hash,
            profile_pic,
        })
        .and_then(|user| {
            let token = db.create_session(user.id)?;
            Ok((user, token))
        })
    };
    let (user, token) = match created {
        Ok(pair) => pair,
        Err(e) => {
            if let Some(media) = &uploaded {
                if let Err(cleanup) = state.media.delete(media.id).await {
                    warn!(media = %media.id, error = %cleanup, "Failed to remove orphaned media");
                }
            }
            return Err(e.into());
        }
    };

    info!(user = %user.id, "User signed up");
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(SessionResponse {
            message: "User created successfully",
            user,
            token,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let req = json_body(body)?;
    let invalid = || ServerError::bad_request("Invalid user credential");

    let found = state.db.lock().await.find_credentials(req.email.trim())?;
    let (user, hash) = found.ok_or_else(invalid)?;

    let password = req.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ServerError::Internal(format!("Verification task failed: {e}")))??;
    if !matches {
        return Err(invalid());
    }

    let token = state.db.lock().await.create_session(user.id)?;

    info!(user = %user.id, "User logged in");
    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(SessionResponse {
            message: "User logged in successfully",
            user,
            token,
        }),
    ))
}

async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServerError> {
    state.db.lock().await.delete_session(&auth.token)?;
    Ok((
        [(header::SET_COOKIE, format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0"))],
        ack("User logged out successfully"),
    ))
}

async fn all_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<User>>, ServerError> {
    let users = state.db.lock().await.list_users_except(auth.id)?;
    Ok(Json(users))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{multipart_request, FilePart, TestApp};
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn avatar_url_is_encoded() {
        assert_eq!(
            default_avatar("Ada Lovelace"),
            "https://ui-avatars.com/api/?name=Ada%20Lovelace&background=random"
        );
    }

    #[tokio::test]
    async fn signup_login_logout() {
        let app = TestApp::new().await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/user/signup",
                None,
                Some(json!({
                    "fullname": "Ada Lovelace",
                    "email": "ada@example.com",
                    "password": "engine",
                    "confirmPassword": "engine",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "ada@example.com");
        assert!(body["user"].get("passwordHash").is_none());

        let (status, body) = app
            .request(
                Method::POST,
                "/api/user/login",
                None,
                Some(json!({ "email": "ada@example.com", "password": "engine" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, _) = app
            .request(Method::POST, "/api/user/logout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .request(Method::GET, "/api/user/allusers", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_rejections() {
        let app = TestApp::new().await;
        app.user("Bob").await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/user/signup",
                None,
                Some(json!({
                    "fullname": "Eve",
                    "email": "eve@example.com",
                    "password": "a",
                    "confirmPassword": "b",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Passwords do not match");

        let (status, body) = app
            .request(
                Method::POST,
                "/api/user/signup",
                None,
                Some(json!({
                    "fullname": "Other Bob",
                    "email": "bob@example.com",
                    "password": "pw",
                    "confirmPassword": "pw",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "User already registered");
    }

    #[tokio::test]
    async fn bad_credentials() {
        let app = TestApp::new().await;
        let (status, body) = app
            .request(
                Method::POST,
                "/api/user/login",
                None,
                Some(json!({ "email": "nobody@example.com", "password": "x" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid user credential");
    }

    #[tokio::test]
    async fn all_users_excludes_caller() {
        let app = TestApp::new().await;
        let alice = app.user("Alice").await;
        let bob = app.user("Bob").await;

        let (status, body) = app
            .request(Method::GET, "/api/user/allusers", Some(&alice.token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec![bob.id.to_string()]);
    }

    const SIGNUP_FIELDS: [(&str, &str); 4] = [
        ("fullname", "Grace Hopper"),
        ("email", "grace@example.com"),
        ("password", "cobol"),
        ("confirmPassword", "cobol"),
    ];

    #[tokio::test]
    async fn multipart_signup_stores_profile_picture() {
        let app = TestApp::new().await;

        let (status, body) = app
            .send(multipart_request(
                "/api/user/signup",
                None,
                &SIGNUP_FIELDS,
                Some(FilePart {
                    field: "profilePic",
                    filename: "me.png",
                    content_type: "image/png",
                    data: b"\x89PNG portrait",
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let url = body["user"]["profilePic"].as_str().unwrap();
        let media_id = app.state.media.id_from_url(url).unwrap();
        assert!(url.ends_with(&format!("/media/{media_id}")));

        let (data, content_type) = app.state.media.get(media_id).await.unwrap();
        assert_eq!(data, b"\x89PNG portrait");
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn multipart_signup_without_picture_uses_default_avatar() {
        let app = TestApp::new().await;

        let (status, body) = app
            .send(multipart_request("/api/user/signup", None, &SIGNUP_FIELDS, None))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["profilePic"], default_avatar("Grace Hopper"));
    }

    #[tokio::test]
    async fn rejected_signup_keeps_no_picture() {
        let app = TestApp::new().await;
        app.user("Grace").await;
        let fields = [
            ("fullname", "Grace Again"),
            ("email", "grace@example.com"),
            ("password", "pw"),
            ("confirmPassword", "pw"),
        ];

        let (status, _) = app
            .send(multipart_request(
                "/api/user/signup",
                None,
                &fields,
                Some(FilePart {
                    field: "profilePic",
                    filename: "me.png",
                    content_type: "image/png",
                    data: b"png",
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let leftover = std::fs::read_dir(&app.state.config.media_storage_path)
            .unwrap()
            .count();
        assert_eq!(leftover, 0);
    }
}
