//! WebSocket bearer-token boundary check
//!
//! The matchmaker consumes only a verified user identity - it does not issue,
//! rotate, or store credentials. This module is the one place that identity
//! crosses the trust boundary: it verifies an HMAC-signed bearer token handed
//! to the WebSocket upgrade and hands back the `userId` it vouches for.
//! Everything downstream of the upgrade (the Event Gateway and the
//! Matchmaker) trusts that identity without re-checking it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by the bearer token: just enough to identify the caller
/// and bound how long the token is good for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject - the authenticated user id.
    pub sub: Uuid,
    /// Expiration (Unix seconds).
    pub exp: u64,
}

/// Verify a `header.payload.signature` bearer token against `secret` and
/// return the user id it vouches for.
pub fn verify_token(token: &str, secret: &str) -> Result<Uuid, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken);
    }
    let (header_b64, payload_b64, signature_b64) = (parts[0], parts[1], parts[2]);

    let message = format!("{}.{}", header_b64, payload_b64);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());
    let expected_signature = mac.finalize().into_bytes();

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    if expected_signature.as_slice() != provided_signature.as_slice() {
        return Err(AuthError::InvalidToken);
    }

    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    if claims.exp < now {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims.sub)
}

/// Pull the bearer token out of an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization")]
    MissingHeader,
    #[error("invalid authorization header format")]
    InvalidFormat,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingHeader => StatusCode::UNAUTHORIZED,
            AuthError::InvalidFormat => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, claims: &TokenClaims) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(b"{}");
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let message = format!("{}.{}", header_b64, payload_b64);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}", message, sig)
    }

    #[test]
    fn valid_token_returns_subject() {
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            exp: u64::MAX,
        };
        let token = sign("secret", &claims);
        assert_eq!(verify_token(&token, "secret").unwrap(), claims.sub);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            exp: u64::MAX,
        };
        let token = sign("secret", &claims);
        assert!(verify_token(&token, "wrong-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            exp: 0,
        };
        let token = sign("secret", &claims);
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(matches!(
            verify_token("not-a-token", "secret"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn extracts_bearer_prefix() {
        assert_eq!(extract_bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }
}
