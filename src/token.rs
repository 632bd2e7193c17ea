use std::sync::Arc;
use std::time::{Duration, SystemTime};

use josekit::jws::alg::hmac::{HmacJwsSigner, HmacJwsVerifier};
use josekit::jws::{JwsHeader, HS256};
use josekit::jwt::{self, JwtPayload, JwtPayloadValidator};
use serde_json::json;

use crate::errors::AppError;
use crate::settings::Auth;

const USER_ID_CLAIM: &str = "user_id";

/// Verifies HS256 bearer credentials and extracts the user id.
#[derive(Clone)]
pub struct TokenVerifier {
    verifier: Arc<HmacJwsVerifier>,
    signer: Arc<HmacJwsSigner>,
}

impl TokenVerifier {
    pub fn new(cfg: &Auth) -> Result<Self, AppError> {
        let key = cfg.token_secret.as_bytes();
        let verifier = HS256.verifier_from_bytes(key)?;
        let signer = HS256.signer_from_bytes(key)?;
        Ok(Self {
            verifier: Arc::new(verifier),
            signer: Arc::new(signer),
        })
    }

    /// Returns the `user_id` claim of a valid, unexpired credential.
    pub fn verify(&self, token: &str) -> Result<i32, AppError> {
        let (payload, _header) = jwt::decode_with_verifier(token, self.verifier.as_ref())
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer credential");
                AppError::Unauthorized("invalid token".to_string())
            })?;

        let mut validator = JwtPayloadValidator::new();
        validator.set_base_time(SystemTime::now());
        validator
            .validate(&payload)
            .map_err(|_| AppError::Unauthorized("token expired".to_string()))?;
        if payload.expires_at().is_none() {
            return Err(AppError::Unauthorized("token has no expiry".to_string()));
        }

        payload
            .claim(USER_ID_CLAIM)
            .and_then(|value| value.as_i64())
            .and_then(|id| i32::try_from(id).ok())
            .ok_or_else(|| AppError::Unauthorized("token carries no user".to_string()))
    }

    /// Signs a credential for `user_id` valid for `ttl`.
    pub fn issue(&self, user_id: i32, ttl: Duration) -> Result<String, AppError> {
        let mut payload = JwtPayload::new();
        payload.set_claim(USER_ID_CLAIM, Some(json!(user_id)))?;
        let now = SystemTime::now();
        payload.set_issued_at(&now);
        payload.set_expires_at(&(now + ttl));

        let mut header = JwsHeader::new();
        header.set_token_type("JWT");
        Ok(jwt::encode_with_signer(&payload, &header, self.signer.as_ref())?)
    }
}

/// Pulls the credential out of an `Authorization: Bearer <token>` value.
pub fn bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(secret: &str) -> TokenVerifier {
        TokenVerifier::new(&Auth {
            token_secret: secret.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = verifier("unit-test-secret-with-enough-bytes");
        let token = tokens.issue(42, Duration::from_secs(60)).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), 42);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = verifier("first-secret-with-enough-bytes-000")
            .issue(1, Duration::from_secs(60))
            .unwrap();
        let err = verifier("second-secret-with-enough-bytes-00")
            .verify(&token)
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_rejected() {
        let tokens = verifier("unit-test-secret-with-enough-bytes");
        let mut payload = JwtPayload::new();
        payload.set_claim("user_id", Some(json!(5))).unwrap();
        payload.set_expires_at(&(SystemTime::now() - Duration::from_secs(3600)));
        let token =
            jwt::encode_with_signer(&payload, &JwsHeader::new(), tokens.signer.as_ref()).unwrap();
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(verifier("unit-test-secret-with-enough-bytes")
            .verify("not-a-token")
            .is_err());
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer("bearer  abc "), Some("abc"));
        assert_eq!(bearer("Basic abc"), None);
        assert_eq!(bearer("Bearer "), None);
        assert_eq!(bearer("abc"), None);
    }
}
