use axum::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::StoreError,
    retry::{self, CONNECT_ATTEMPTS, CONNECT_DELAY},
};

/// Maps a bearer token to the id of the user it was issued for.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Uuid, StoreError>;
}

#[derive(Debug, Serialize)]
struct VerifyTokenRequest<'a> {
    access_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyTokenResponse {
    user_id: Uuid,
}

/// Client of the external auth service.
#[derive(Clone)]
pub struct RemoteIdentityResolver {
    http: reqwest::Client,
    verify_url: reqwest::Url,
}

impl RemoteIdentityResolver {
    pub fn new(addr: &str) -> Result<Self, StoreError> {
        let base = reqwest::Url::parse(addr)
            .map_err(|e| StoreError::Validation(format!("auth service address {addr:?}: {e}")))?;
        let verify_url = base
            .join("/v1/tokens/verify")
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { http, verify_url })
    }

    pub async fn connect(addr: &str) -> Result<Self, StoreError> {
        let resolver =
            retry::with_delay(CONNECT_ATTEMPTS, CONNECT_DELAY, || async { Self::new(addr) })
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(url = %resolver.verify_url(), "auth client ready");
        Ok(resolver)
    }

    pub fn verify_url(&self) -> &str {
        self.verify_url.as_str()
    }
}

#[async_trait]
impl IdentityResolver for RemoteIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Uuid, StoreError> {
        let resp = self
            .http
            .post(self.verify_url.clone())
            .json(&VerifyTokenRequest {
                access_token: token,
            })
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("auth service: {e}")))?;

        match resp.status() {
            s if s.is_success() => {
                let body: VerifyTokenResponse = resp
                    .json()
                    .await
                    .map_err(|e| StoreError::Backend(format!("auth service response: {e}")))?;
                debug!(user_id = %body.user_id, "token resolved");
                Ok(body.user_id)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(StoreError::Unauthorized("token rejected".into()))
            }
            s => Err(StoreError::Backend(format!("auth service returned {s}"))),
        }
    }
}
