//! JWT bearer-token authorizer.
//!
//! Verifies `Authorization: Bearer <jwt>` and uses the token's `sub`
//! claim as the user token. The usual deployment verifies RS256
//! signatures against the auth server's public key; an HS256
//! shared-secret mode exists for symmetric setups and tests.

use crate::{Authorizer, MAX_USER_TOKEN_LENGTH};
use async_trait::async_trait;
use http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use vss_proto::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
}

pub struct JwtAuthorizer {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthorizer {
    /// RS256 verification against a PEM-encoded RSA public key.
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self {
            key: DecodingKey::from_rsa_pem(pem)?,
            validation: Validation::new(Algorithm::RS256),
        })
    }

    /// HS256 verification with a shared secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl Authorizer for JwtAuthorizer {
    async fn authorize(&self, headers: &HeaderMap) -> Result<String, ApiError> {
        let header = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Auth("missing authorization header".to_string()))?;

        let token = header.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
            ApiError::Auth("authorization header is not a bearer token".to_string())
        })?;

        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|_| ApiError::Auth("invalid bearer token".to_string()))?;

        let user_token = data
            .claims
            .sub
            .filter(|sub| !sub.trim().is_empty())
            .ok_or_else(|| ApiError::Auth("token subject is missing or blank".to_string()))?;

        if user_token.len() > MAX_USER_TOKEN_LENGTH {
            return Err(ApiError::Auth(format!(
                "token subject exceeds {} characters",
                MAX_USER_TOKEN_LENGTH
            )));
        }

        Ok(user_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &[u8] = b"test-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: u64,
    }

    fn epoch_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn token(sub: &str, exp: u64) -> String {
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_valid_token_yields_subject() {
        let authorizer = JwtAuthorizer::from_secret(SECRET);
        let headers = bearer_headers(&token("alice", epoch_now() + 600));
        assert_eq!(authorizer.authorize(&headers).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let authorizer = JwtAuthorizer::from_secret(SECRET);
        let result = authorizer.authorize(&HeaderMap::new()).await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn test_non_bearer_header_rejected() {
        let authorizer = JwtAuthorizer::from_secret(SECRET);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        let result = authorizer.authorize(&headers).await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let foreign = encode(
            &Header::default(),
            &TestClaims {
                sub: "alice".to_string(),
                exp: epoch_now() + 600,
            },
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();

        let authorizer = JwtAuthorizer::from_secret(SECRET);
        let result = authorizer.authorize(&bearer_headers(&foreign)).await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let authorizer = JwtAuthorizer::from_secret(SECRET);
        let headers = bearer_headers(&token("alice", epoch_now().saturating_sub(3600)));
        let result = authorizer.authorize(&headers).await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn test_blank_subject_rejected() {
        let authorizer = JwtAuthorizer::from_secret(SECRET);
        let headers = bearer_headers(&token("  ", epoch_now() + 600));
        let result = authorizer.authorize(&headers).await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn test_overlong_subject_rejected() {
        let authorizer = JwtAuthorizer::from_secret(SECRET);
        let long_sub = "x".repeat(MAX_USER_TOKEN_LENGTH + 1);
        let headers = bearer_headers(&token(&long_sub, epoch_now() + 600));
        let result = authorizer.authorize(&headers).await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
    }
}
