use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{User, UserFieldsUpdate};
use crate::error::StoreError;

const USER_COLUMNS: &str = "id, email, username, password, description, profile_image_ref, \
                            is_email_verified, created_at, updated_at";

/// Document store for user records. Records are keyed by id; email is unique.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Persists a new record; `Conflict` if the email is taken.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<User, StoreError>;
    #[allow(dead_code)]
    async fn find_by_id(&self, id: Uuid) -> Result<User, StoreError>;
    /// Sets the verified flag. Already-verified records are not an error.
    async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError>;
    /// Applies the supplied fields and returns the record after the update.
    async fn update_fields(&self, id: Uuid, update: UserFieldsUpdate) -> Result<User, StoreError>;
    /// Removes the record and hands back the image key it held.
    async fn delete_by_id(&self, id: Uuid) -> Result<Option<String>, StoreError>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
    table: String,
}

impl PgUserRepo {
    /// `table` must already be a validated identifier (see `config`).
    pub fn new(db: PgPool, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }
}

// Binds $1..$9 in `USER_COLUMNS` order.
fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    )
}

// $1 id; each optional field takes a (supplied, value) pair; $8 updated_at.
fn update_fields_sql(table: &str) -> String {
    format!(
        r#"
        UPDATE {table}
           SET username          = CASE WHEN $2 THEN $3 ELSE username END,
               description       = CASE WHEN $4 THEN $5 ELSE description END,
               profile_image_ref = CASE WHEN $6 THEN $7 ELSE profile_image_ref END,
               updated_at        = $8
         WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    )
}

fn delete_sql(table: &str) -> String {
    format!("DELETE FROM {table} WHERE id = $1 RETURNING profile_image_ref")
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(&insert_sql(&self.table))
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password)
            .bind(&user.description)
            .bind(&user.profile_image_ref)
            .bind(user.is_email_verified)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let sql = format!("SELECT {} FROM {} WHERE email = $1", USER_COLUMNS, self.table);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        user.ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", USER_COLUMNS, self.table);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        user.ok_or(StoreError::NotFound)
    }

    async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET is_email_verified = TRUE WHERE id = $1",
            self.table
        );
        let res = sqlx::query(&sql).bind(id).execute(&self.db).await?;
        // matched rows count even when the flag was already set
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_fields(&self, id: Uuid, update: UserFieldsUpdate) -> Result<User, StoreError> {
        let (set_username, username) = update.username.into_parts();
        let (set_description, description) = update.description.into_parts();
        let (set_image, image_ref) = update.profile_image_ref.into_parts();

        let user = sqlx::query_as::<_, User>(&update_fields_sql(&self.table))
            .bind(id)
            .bind(set_username)
            .bind(username)
            .bind(set_description)
            .bind(description)
            .bind(set_image)
            .bind(image_ref)
            .bind(update.updated_at)
            .fetch_optional(&self.db)
            .await?;
        user.ok_or(StoreError::NotFound)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_as::<_, (Option<String>,)>(&delete_sql(&self.table))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(|(image_ref,)| image_ref).ok_or(StoreError::NotFound)
    }
}
