//! Record/blob coordination.
//!
//! A user's `profile_image_ref` must be empty or name a blob that exists.
//! The two stores share no transaction, so each operation orders its writes
//! to keep that true on the happy path:
//!
//! * create and update upload the blob before the record points at it;
//! * delete removes the record before the blob it referenced.
//!
//! A failure after the first write leaves its effect in place. A blob
//! uploaded for a record that never got written, or one superseded by a
//! newer image, stays in the bucket as an orphan. A record deleted whose
//! blob could not be removed is still gone. No compensation is attempted.

use std::sync::Arc;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    repo::UserRepo,
    repo_types::{NewUser, Patch, User, UserFieldsUpdate, UserPatch},
};
use crate::{
    error::{OpContext, ServiceError, StoreError},
    storage::{StorageClient, IMAGE_CONTENT_TYPE, IMAGE_URL_TTL_SECS},
};

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepo>,
    storage: Arc<dyn StorageClient>,
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepo>, storage: Arc<dyn StorageClient>) -> Self {
        Self { repo, storage }
    }

    /// Stores `body` under a fresh blob key and returns the key.
    async fn upload_image(&self, body: Bytes) -> Result<String, StoreError> {
        let key = Uuid::new_v4().to_string();
        self.storage
            .put_object(&key, body, IMAGE_CONTENT_TYPE)
            .await?;
        Ok(key)
    }

    #[instrument(skip(self, new), fields(email = %new.email))]
    pub async fn create_user(&self, new: NewUser) -> Result<Uuid, ServiceError> {
        const OP: &str = "users.create";

        let profile_image_ref = match new.image {
            Some(body) => Some(self.upload_image(body).await.op(OP)?),
            None => None,
        };

        let now = now_unix();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            username: non_empty(new.username),
            password: new.password,
            description: non_empty(new.description),
            profile_image_ref,
            is_email_verified: false,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.repo.insert(&user).await {
            if let Some(key) = &user.profile_image_ref {
                warn!(image = %key, "record insert failed; uploaded image left orphaned");
            }
            return Err(ServiceError::new(OP, e));
        }

        info!(user_id = %user.id, "user created");
        Ok(user.id)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, email: &str) -> Result<User, ServiceError> {
        self.repo.find_by_email(email).await.op("users.get")
    }

    #[instrument(skip(self))]
    pub async fn verify_email(&self, id: Uuid) -> Result<(), ServiceError> {
        self.repo.set_email_verified(id).await.op("users.verify_email")?;
        info!(user_id = %id, "email verified");
        Ok(())
    }

    /// Applies a partial update. A new image is uploaded first and linked in
    /// the same field update; the image it replaces is not deleted.
    #[instrument(skip(self, patch), fields(image = patch.image.is_some()))]
    pub async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User, ServiceError> {
        const OP: &str = "users.update";

        let profile_image_ref = match patch.image {
            Some(body) => Patch::Set(self.upload_image(body).await.op(OP)?),
            None => Patch::Keep,
        };

        let update = UserFieldsUpdate {
            username: patch.username,
            description: patch.description,
            profile_image_ref,
            updated_at: now_unix(),
        };
        let user = self.repo.update_fields(id, update).await.op(OP)?;

        info!(user_id = %id, "user updated");
        Ok(user)
    }

    /// Deletes the record, then the blob it referenced. A blob that is
    /// already gone is logged and ignored; other blob failures are returned
    /// without restoring the record.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: Uuid) -> Result<(), ServiceError> {
        const OP: &str = "users.delete";

        let image_ref = self.repo.delete_by_id(id).await.op(OP)?;
        info!(user_id = %id, "user deleted");

        let Some(key) = image_ref.filter(|k| !k.is_empty()) else {
            return Ok(());
        };
        match self.storage.delete_object(&key).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => {
                warn!(user_id = %id, image = %key, "profile image already missing");
                Ok(())
            }
            Err(e) => {
                warn!(user_id = %id, image = %key, error = %e, "profile image left behind");
                Err(ServiceError::new(OP, e))
            }
        }
    }

    /// Presigned retrieval URL for the user's image, if any. A reference whose
    /// blob is gone yields no URL; the record itself is still served.
    pub async fn profile_image_url(&self, user: &User) -> Result<Option<String>, ServiceError> {
        let Some(key) = user.profile_image_ref.as_deref().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        match self.storage.presign_get(key, IMAGE_URL_TTL_SECS).await {
            Ok(url) => Ok(Some(url)),
            Err(StoreError::NotFound) => {
                warn!(user_id = %user.id, image = %key, "profile image missing");
                Ok(None)
            }
            Err(e) => Err(ServiceError::new("users.image_url", e)),
        }
    }
}
