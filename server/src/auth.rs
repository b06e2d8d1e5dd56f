//! Bearer-token verification and request authentication.
//!
//! The JWT contract: HS256/384/512 and RS256/384/512, 60 s clock leeway by
//! default, issuer/audience validated when configured, and a mandatory
//! `tenant_id` claim. Failures map onto the symbolic codes
//! `INVALID_TOKEN | INVALID_SIGNATURE | TOKEN_EXPIRED | MISSING_TENANT`.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use strata_core::{ErrorCode, FsError, FsResult};

use crate::state::AuthSection;
use crate::tools::ToolContext;

const HMAC_ALGORITHMS: &[Algorithm] = &[Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
const RSA_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Claims the service consumes. Everything else in the token is ignored.
#[derive(Debug, Deserialize)]
pub struct TokenClaims {
    pub sub: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Space-separated form, merged with `scopes`.
    pub scope: Option<String>,
    #[allow(dead_code)]
    pub exp: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub user_id: Option<String>,
    pub tenant_id: String,
    pub scopes: Vec<String>,
}

/// Validates a bearer token into a [`VerifiedToken`].
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> FsResult<VerifiedToken>;
}

pub struct JwtVerifier {
    key: DecodingKey,
    allowed: &'static [Algorithm],
    issuer: Option<String>,
    audience: Option<String>,
    leeway_secs: u64,
}

impl JwtVerifier {
    /// Build a verifier from the `[auth]` section. Returns `None` when no key
    /// material is configured.
    pub fn from_config(auth: &AuthSection) -> Option<Self> {
        if let Some(ref secret) = auth.jwt_secret {
            return Some(JwtVerifier {
                key: DecodingKey::from_secret(secret.as_bytes()),
                allowed: HMAC_ALGORITHMS,
                issuer: auth.issuer.clone(),
                audience: auth.audience.clone(),
                leeway_secs: auth.leeway_secs,
            });
        }
        if let Some(ref pem) = auth.jwt_public_key {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes()).ok()?;
            return Some(JwtVerifier {
                key,
                allowed: RSA_ALGORITHMS,
                issuer: auth.issuer.clone(),
                audience: auth.audience.clone(),
                leeway_secs: auth.leeway_secs,
            });
        }
        None
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> FsResult<VerifiedToken> {
        let header = decode_header(token)
            .map_err(|e| FsError::new(ErrorCode::InvalidToken, format!("malformed token: {e}")))?;
        if !self.allowed.contains(&header.alg) {
            return Err(FsError::new(
                ErrorCode::InvalidToken,
                format!("algorithm {:?} is not accepted", header.alg),
            ));
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway_secs;
        if let Some(ref iss) = self.issuer {
            validation.set_issuer(&[iss]);
        }
        match self.audience {
            Some(ref aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data = decode::<TokenClaims>(token, &self.key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    FsError::new(ErrorCode::TokenExpired, "token has expired")
                }
                ErrorKind::InvalidSignature => {
                    FsError::new(ErrorCode::InvalidSignature, "token signature is invalid")
                }
                other => {
                    FsError::new(ErrorCode::InvalidToken, format!("token validation failed: {other:?}"))
                }
            }
        })?;

        let claims = data.claims;
        let tenant_id = claims
            .tenant_id
            .ok_or_else(|| FsError::new(ErrorCode::MissingTenant, "token lacks a tenant_id claim"))?;

        let mut scopes = claims.scopes;
        if let Some(ref joined) = claims.scope {
            scopes.extend(joined.split_whitespace().map(str::to_string));
        }
        Ok(VerifiedToken { user_id: claims.sub, tenant_id, scopes })
    }
}

/// Build the tool context for a request: verified token when a bearer header
/// is present and a verifier is configured, anonymous otherwise.
pub fn authenticate(
    headers: &HeaderMap,
    verifier: Option<&dyn TokenVerifier>,
) -> FsResult<ToolContext> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (bearer, verifier) {
        (Some(token), Some(verifier)) => {
            let verified = verifier.verify(token)?;
            Ok(ToolContext {
                authenticated: true,
                user_id: verified.user_id,
                tenant_id: Some(verified.tenant_id),
                scopes: verified.scopes,
                anonymous_allowed: false,
            })
        }
        // A token with no verifier configured cannot authenticate anyone.
        _ => Ok(ToolContext::anonymous()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn sign(claims: &serde_json::Value, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn verifier(secret: &str) -> JwtVerifier {
        JwtVerifier::from_config(&AuthSection {
            jwt_secret: Some(secret.to_string()),
            ..AuthSection::default()
        })
        .unwrap()
    }

    fn future_exp() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600
    }

    #[test]
    fn valid_token_yields_claims() {
        let token = sign(
            &json!({
                "sub": "user-1",
                "tenant_id": "acme",
                "scopes": ["read"],
                "scope": "files:write",
                "exp": future_exp(),
            }),
            "s3cret",
        );
        let verified = verifier("s3cret").verify(&token).unwrap();
        assert_eq!(verified.user_id.as_deref(), Some("user-1"));
        assert_eq!(verified.tenant_id, "acme");
        assert_eq!(verified.scopes, vec!["read", "files:write"]);
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let token = sign(&json!({ "tenant_id": "acme", "exp": future_exp() }), "right");
        let err = verifier("wrong").verify(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSignature);
    }

    #[test]
    fn expired_token_is_token_expired() {
        let token = sign(&json!({ "tenant_id": "acme", "exp": 1 }), "s");
        let err = verifier("s").verify(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);
    }

    #[test]
    fn missing_tenant_is_rejected() {
        let token = sign(&json!({ "sub": "u", "exp": future_exp() }), "s");
        let err = verifier("s").verify(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingTenant);
    }

    #[test]
    fn garbage_is_invalid_token() {
        let err = verifier("s").verify("not-a-jwt").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);
    }

    #[test]
    fn authenticate_without_header_is_anonymous() {
        let headers = HeaderMap::new();
        let v = verifier("s");
        let ctx = authenticate(&headers, Some(&v)).unwrap();
        assert!(!ctx.authenticated);
        assert!(ctx.anonymous_allowed);
    }

    #[test]
    fn authenticate_with_valid_bearer() {
        let token = sign(&json!({ "tenant_id": "t", "exp": future_exp() }), "s");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let v = verifier("s");
        let ctx = authenticate(&headers, Some(&v)).unwrap();
        assert!(ctx.authenticated);
        assert_eq!(ctx.tenant_id.as_deref(), Some("t"));
    }
}
