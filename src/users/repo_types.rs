use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User record as persisted in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: String,
    pub description: Option<String>,
    /// Key of the profile image blob; `None` when the user has no image.
    pub profile_image_ref: Option<String>,
    pub is_email_verified: bool,
    pub created_at: i64, // unix seconds
    pub updated_at: i64, // unix seconds
}

/// Per-field instruction for a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    /// Leave the stored value untouched.
    #[default]
    Keep,
    /// Store "no value".
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    /// Resolves the patch against the current value.
    #[cfg(test)]
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(v) => Some(v),
        }
    }

    /// `(supplied, new value)` pair as bound into the update statement.
    pub fn into_parts(self) -> (bool, Option<T>) {
        match self {
            Patch::Keep => (false, None),
            Patch::Clear => (true, None),
            Patch::Set(v) => (true, Some(v)),
        }
    }
}

impl Patch<String> {
    /// Wire convention: missing or null keeps, empty string clears.
    pub fn from_wire(value: Option<String>) -> Self {
        match value {
            None => Patch::Keep,
            Some(v) if v.is_empty() => Patch::Clear,
            Some(v) => Patch::Set(v),
        }
    }
}

/// Field changes handed to the document store in one update.
#[derive(Debug, Clone, Default)]
pub struct UserFieldsUpdate {
    pub username: Patch<String>,
    pub description: Patch<String>,
    pub profile_image_ref: Patch<String>,
    pub updated_at: i64,
}

/// Input of the create operation. The image arrives as raw bytes; the
/// coordinator owns the blob key.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub password: String,
    pub description: Option<String>,
    pub image: Option<Bytes>,
}

/// Caller-facing partial update of a user profile.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Patch<String>,
    pub description: Patch<String>,
    pub image: Option<Bytes>,
}
