//! Authorization seam for the versioned storage service.
//!
//! An [`Authorizer`] turns request headers into an opaque `user_token`
//! or fails the request with an auth error. The engine never parses the
//! token; it only namespaces records under it.

pub mod jwt;

use async_trait::async_trait;
use http::HeaderMap;
use vss_proto::ApiError;

pub use jwt::JwtAuthorizer;

/// Longest accepted user token; matches the schema's column width.
pub const MAX_USER_TOKEN_LENGTH: usize = 120;

/// Identity every request runs under when no real authorizer is wired.
const UNAUTHENTICATED_USER: &str = "unauth-user";

/// Verifies a request before it reaches the engine.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns the authenticated `user_token`, or [`ApiError::Auth`].
    async fn authorize(&self, headers: &HeaderMap) -> Result<String, ApiError>;
}

/// Accepts every request under a fixed identity. Only meant for trusted
/// single-tenant deployments and tests.
pub struct NoopAuthorizer;

#[async_trait]
impl Authorizer for NoopAuthorizer {
    async fn authorize(&self, _headers: &HeaderMap) -> Result<String, ApiError> {
        Ok(UNAUTHENTICATED_USER.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_authorizer_fixed_identity() {
        let headers = HeaderMap::new();
        let user = NoopAuthorizer.authorize(&headers).await.unwrap();
        assert_eq!(user, "unauth-user");
    }
}
