use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{delete, patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        decode_image, CreateUserRequest, CreateUserResponse, GetUserQuery, GetUserResponse,
        UpdateUserInfoRequest, UpdateUserInfoResponse,
    },
    repo_types::{NewUser, Patch, UserPatch},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ServiceError, StoreError},
    state::AppState,
};

type ApiError = (StatusCode, String);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn bad_request(msg: &str) -> ApiError {
    warn!(reason = msg, "invalid request");
    (StatusCode::BAD_REQUEST, msg.to_string())
}

/// Maps a coordinator failure onto a status code; backend detail stays in the log.
fn reject(e: ServiceError, public: &str) -> ApiError {
    let status = match e.kind() {
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::Conflict => StatusCode::CONFLICT,
        StoreError::Connection(_) | StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, "{}", public);
        (status, public.to_string())
    } else {
        warn!(error = %e, "{}", public);
        (status, format!("{}: {}", public, e.kind()))
    }
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(create_user).get(get_user))
        .route("/v1/users/me", patch(update_user_info))
        .route("/v1/users/:id", delete(delete_user))
        .route("/v1/users/:id/verify-email", post(verify_email))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiError> {
    let email = payload.email.trim().to_string();
    if email.is_empty() {
        return Err(bad_request("email is required"));
    }
    if payload.password.is_empty() {
        return Err(bad_request("password is required"));
    }
    if !is_valid_email(&email) {
        return Err(bad_request("not valid email"));
    }
    let image = decode_image(payload.profile_image.as_deref()).map_err(bad_request)?;

    let id = state
        .users
        .create_user(NewUser {
            email,
            username: payload.username,
            password: payload.password,
            description: payload.description,
            image,
        })
        .await
        .map_err(|e| reject(e, "failed to save user"))?;

    Ok((StatusCode::CREATED, Json(CreateUserResponse { id })))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Query(q): Query<GetUserQuery>,
) -> Result<Json<GetUserResponse>, ApiError> {
    let email = q.email.trim();
    if email.is_empty() {
        return Err(bad_request("email is required"));
    }
    if !is_valid_email(email) {
        return Err(bad_request("not valid email"));
    }

    let user = state
        .users
        .get_user(email)
        .await
        .map_err(|e| reject(e, "failed to get user"))?;
    let profile_image_url = state
        .users
        .profile_image_url(&user)
        .await
        .map_err(|e| reject(e, "failed to get user"))?;

    Ok(Json(GetUserResponse {
        id: user.id,
        email: user.email,
        username: user.username,
        description: user.description,
        profile_image_url,
        password: user.password,
        is_email_verified: user.is_email_verified,
    }))
}

#[instrument(skip(state))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .users
        .verify_email(id)
        .await
        .map_err(|e| reject(e, "failed to verify email"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn update_user_info(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateUserInfoRequest>,
) -> Result<Json<UpdateUserInfoResponse>, ApiError> {
    let image = decode_image(payload.profile_image.as_deref()).map_err(bad_request)?;
    let patch = UserPatch {
        username: Patch::from_wire(payload.username),
        description: Patch::from_wire(payload.description),
        image,
    };

    let user = state
        .users
        .update_user(user_id, patch)
        .await
        .map_err(|e| reject(e, "failed to update user"))?;
    let profile_image_url = state
        .users
        .profile_image_url(&user)
        .await
        .map_err(|e| reject(e, "failed to update user"))?;

    Ok(Json(UpdateUserInfoResponse {
        id: user.id,
        email: user.email,
        username: user.username,
        description: user.description,
        profile_image_url,
    }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .users
        .delete_user(id)
        .await
        .map_err(|e| reject(e, "failed to delete user"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
        Router,
    };
    use base64ct::{Base64, Encoding};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::identity::memory::StaticIdentity,
        storage::memory::MemoryStorage,
        users::{self, repo::memory::MemoryUserRepo},
    };

    const TOKEN: &str = "good-token";

    struct Harness {
        app: Router,
        storage: Arc<MemoryStorage>,
    }

    fn harness_for(me: Uuid) -> Harness {
        let repo = Arc::new(MemoryUserRepo::default());
        let storage = Arc::new(MemoryStorage::default());
        let identity = Arc::new(StaticIdentity {
            tokens: HashMap::from([(TOKEN.to_string(), me)]),
        });
        let state = AppState::fake(repo, storage.clone(), identity);
        Harness {
            app: users::router().with_state(state),
            storage,
        }
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn create(app: &Router, email: &str, image: Option<&[u8]>) -> Uuid {
        let mut body = serde_json::json!({
            "email": email,
            "username": "ann",
            "password": "x",
            "description": "",
        });
        if let Some(img) = image {
            body["profile_image"] = Base64::encode_string(img).into();
        }
        let (status, bytes) = send(app, json_request(Method::POST, "/v1/users", body)).await;
        assert_eq!(status, StatusCode::CREATED);
        serde_json::from_slice::<CreateUserResponse>(&bytes).unwrap().id
    }

    async fn fetch(app: &Router, email: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .uri(format!("/v1/users?email={email}"))
            .body(Body::empty())
            .unwrap();
        send(app, req).await
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("a@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("no spaces@b.com"));
    }

    #[tokio::test]
    async fn create_then_get_round_trips_over_http() {
        let h = harness_for(Uuid::new_v4());
        let id = create(&h.app, "a@b.com", Some(&[0x89, 0x50])).await;

        let (status, bytes) = fetch(&h.app, "a@b.com").await;
        assert_eq!(status, StatusCode::OK);
        let user: GetUserResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.password, "x");
        assert!(!user.is_email_verified);
        assert_eq!(user.description, None);
        assert!(user.profile_image_url.unwrap().starts_with("https://fake.local/"));
        assert_eq!(h.storage.len(), 1);
    }

    #[tokio::test]
    async fn create_validates_presence_and_syntax() {
        let h = harness_for(Uuid::new_v4());
        for body in [
            serde_json::json!({"password": "x"}),
            serde_json::json!({"email": "a@b.com"}),
            serde_json::json!({"email": "not-an-email", "password": "x"}),
            serde_json::json!({"email": "a@b.com", "password": "x", "profile_image": "%%"}),
        ] {
            let (status, _) = send(&h.app, json_request(Method::POST, "/v1/users", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn duplicate_create_is_conflict() {
        let h = harness_for(Uuid::new_v4());
        create(&h.app, "a@b.com", None).await;
        let body = serde_json::json!({"email": "a@b.com", "password": "y"});
        let (status, _) = send(&h.app, json_request(Method::POST, "/v1/users", body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let h = harness_for(Uuid::new_v4());
        let (status, _) = fetch(&h.app, "ghost@b.com").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = fetch(&h.app, "ghost").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verify_email_twice_then_delete() {
        let h = harness_for(Uuid::new_v4());
        let id = create(&h.app, "a@b.com", Some(&[1, 2, 3])).await;

        for _ in 0..2 {
            let req = Request::builder()
                .method(Method::POST)
                .uri(format!("/v1/users/{id}/verify-email"))
                .body(Body::empty())
                .unwrap();
            assert_eq!(send(&h.app, req).await.0, StatusCode::NO_CONTENT);
        }
        let (_, bytes) = fetch(&h.app, "a@b.com").await;
        let user: GetUserResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(user.is_email_verified);

        let delete = || {
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/v1/users/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(send(&h.app, delete()).await.0, StatusCode::NO_CONTENT);
        assert_eq!(h.storage.len(), 0);
        assert_eq!(send(&h.app, delete()).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_id_is_rejected() {
        let h = harness_for(Uuid::new_v4());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/v1/users/not-a-uuid/verify-email")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&h.app, req).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_requires_resolvable_bearer_token() {
        let h = harness_for(Uuid::new_v4());
        let body = serde_json::json!({"username": "bob"});

        let req = json_request(Method::PATCH, "/v1/users/me", body.clone());
        assert_eq!(send(&h.app, req).await.0, StatusCode::UNAUTHORIZED);

        let mut req = json_request(Method::PATCH, "/v1/users/me", body);
        req.headers_mut()
            .insert(header::AUTHORIZATION, "Bearer bogus".parse().unwrap());
        assert_eq!(send(&h.app, req).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_applies_to_the_token_owner() {
        // the identity resolver must map the token to the record created below
        let repo = Arc::new(MemoryUserRepo::default());
        let storage = Arc::new(MemoryStorage::default());
        let bootstrap = AppState::fake(
            repo.clone(),
            storage.clone(),
            Arc::new(StaticIdentity::default()),
        );
        let id = create(&users::router().with_state(bootstrap), "a@b.com", None).await;

        let identity = Arc::new(StaticIdentity {
            tokens: HashMap::from([(TOKEN.to_string(), id)]),
        });
        let app = users::router().with_state(AppState::fake(repo, storage.clone(), identity));

        let mut req = json_request(
            Method::PATCH,
            "/v1/users/me",
            serde_json::json!({
                "description": "hi",
                "profile_image": Base64::encode_string(&[7, 7, 7]),
            }),
        );
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {TOKEN}").parse().unwrap(),
        );
        let (status, bytes) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);

        let user: UpdateUserInfoResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username.as_deref(), Some("ann"));
        assert_eq!(user.description.as_deref(), Some("hi"));
        assert!(user.profile_image_url.is_some());
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn get_with_missing_image_blob_still_returns_user() {
        let h = harness_for(Uuid::new_v4());
        let id = create(&h.app, "a@b.com", Some(&[0x89, 0x50])).await;
        h.storage.clear();

        let (status, bytes) = fetch(&h.app, "a@b.com").await;
        assert_eq!(status, StatusCode::OK);
        let user: GetUserResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.profile_image_url, None);
    }

    #[tokio::test]
    async fn update_with_missing_image_blob_reports_success() {
        let repo = Arc::new(MemoryUserRepo::default());
        let storage = Arc::new(MemoryStorage::default());
        let bootstrap = AppState::fake(
            repo.clone(),
            storage.clone(),
            Arc::new(StaticIdentity::default()),
        );
        let id = create(&users::router().with_state(bootstrap), "a@b.com", Some(&[1, 2])).await;
        storage.clear();

        let identity = Arc::new(StaticIdentity {
            tokens: HashMap::from([(TOKEN.to_string(), id)]),
        });
        let app = users::router().with_state(AppState::fake(repo, storage, identity));

        let mut req = json_request(
            Method::PATCH,
            "/v1/users/me",
            serde_json::json!({"username": "bob"}),
        );
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {TOKEN}").parse().unwrap(),
        );
        let (status, bytes) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);

        let user: UpdateUserInfoResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username.as_deref(), Some("bob"));
        assert_eq!(user.profile_image_url, None);

        let (_, bytes) = fetch(&app, "a@b.com").await;
        let stored: GetUserResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored.username.as_deref(), Some("bob"));
    }
}
