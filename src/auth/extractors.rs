use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{error::StoreError, state::AppState};

/// Resolves the bearer token through the identity service, yielding the user ID.
pub struct AuthUser(pub Uuid);

fn bearer_token(parts: &Parts) -> Result<&str, (StatusCode, String)> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header".into()))?;

    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or((StatusCode::UNAUTHORIZED, "wrong token type, need Bearer".into()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        match state.identity.resolve(token).await {
            Ok(id) => Ok(AuthUser(id)),
            Err(StoreError::Unauthorized(reason)) => {
                warn!(%reason, "token rejected");
                Err((StatusCode::UNAUTHORIZED, "invalid or expired token".into()))
            }
            Err(e) => {
                error!(error = %e, "identity resolution failed");
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to get user id".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(auth: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/v1/users/me");
        if let Some(v) = auth {
            req = req.header("authorization", v);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc"))).unwrap(), "abc");
        assert_eq!(bearer_token(&parts(Some("bearer abc"))).unwrap(), "abc");
        assert_eq!(
            bearer_token(&parts(None)).unwrap_err().0,
            StatusCode::UNAUTHORIZED
        );
        assert!(bearer_token(&parts(Some("Basic dXNlcg=="))).is_err());
        assert!(bearer_token(&parts(Some("Bearer "))).is_err());
    }
}
