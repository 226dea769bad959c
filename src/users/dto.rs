use base64ct::{Base64, Encoding};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for CreateUser. `profile_image` is base64-encoded.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GetUserQuery {
    #[serde(default)]
    pub email: String,
}

/// GetUser result. Carries the stored password for the auth service.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetUserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub description: Option<String>,
    pub profile_image_url: Option<String>,
    pub password: String,
    pub is_email_verified: bool,
}

/// UpdateUserInfo body: a missing or null field is kept, `""` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserInfoRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateUserInfoResponse {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub description: Option<String>,
    pub profile_image_url: Option<String>,
}

/// Decodes an optional base64 image. Empty payloads are rejected.
pub fn decode_image(b64: Option<&str>) -> Result<Option<Bytes>, &'static str> {
    let Some(b64) = b64 else {
        return Ok(None);
    };
    let bytes = Base64::decode_vec(b64.trim()).map_err(|_| "profile_image is not valid base64")?;
    if bytes.is_empty() {
        return Err("profile_image is empty");
    }
    Ok(Some(Bytes::from(bytes)))
}
