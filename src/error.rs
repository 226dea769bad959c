use thiserror::Error;

/// Failure kinds reported by the store adapters and the identity resolver.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Conflict,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// An adapter error annotated with the coordinator operation that hit it.
#[derive(Debug, Error)]
#[error("{op}: {source}")]
pub struct ServiceError {
    pub op: &'static str,
    #[source]
    pub source: StoreError,
}

impl ServiceError {
    pub fn new(op: &'static str, source: StoreError) -> Self {
        Self { op, source }
    }

    pub fn kind(&self) -> &StoreError {
        &self.source
    }
}

/// Attaches an operation name to adapter results.
pub trait OpContext<T> {
    fn op(self, op: &'static str) -> Result<T, ServiceError>;
}

impl<T> OpContext<T> for Result<T, StoreError> {
    fn op(self, op: &'static str) -> Result<T, ServiceError> {
        self.map_err(|e| ServiceError::new(op, e))
    }
}
