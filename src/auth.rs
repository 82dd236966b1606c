use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Server-side key the bearer tokens are signed with. The auth collaborator
/// that issues credentials shares this secret; this service only verifies.
#[derive(Clone)]
pub struct TokenSecret(String);

impl TokenSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    exp: i64,
}

fn mac_for(secret: &TokenSecret, body: &str) -> HmacSha256 {
    // HMAC-SHA256 accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.0.as_bytes()).expect("HMAC key");
    mac.update(body.as_bytes());
    mac
}

/// Mints a signed bearer token: `base64url(claims) "." base64url(tag)`.
///
/// Issuance lives here for the seed tool and tests; the production issuer is
/// the external auth collaborator holding the same secret.
pub fn issue_token(secret: &TokenSecret, user_id: Uuid, ttl: Duration) -> String {
    let claims = Claims {
        sub: user_id,
        exp: (Utc::now() + ttl).timestamp(),
    };
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims serialize"));
    let tag = URL_SAFE_NO_PAD.encode(mac_for(secret, &body).finalize().into_bytes());
    format!("{body}.{tag}")
}

/// Checks the tag (constant-time) and expiry, returning the user id carried
/// in the claims. Any malformed, forged, or expired token is `Unauthorized`.
pub fn verify_token(secret: &TokenSecret, token: &str) -> Result<Uuid, AppError> {
    let (body, tag) = token.split_once('.').ok_or(AppError::Unauthorized)?;
    let tag = URL_SAFE_NO_PAD
        .decode(tag)
        .map_err(|_| AppError::Unauthorized)?;
    mac_for(secret, body)
        .verify_slice(&tag)
        .map_err(|_| AppError::Unauthorized)?;

    let claims: Claims = URL_SAFE_NO_PAD
        .decode(body)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(AppError::Unauthorized)?;
    if claims.exp < Utc::now().timestamp() {
        return Err(AppError::Unauthorized);
    }
    Ok(claims.sub)
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn verify_request(req: &HttpRequest, token: &str) -> Result<Uuid, AppError> {
    let secret = req
        .app_data::<web::Data<TokenSecret>>()
        .ok_or_else(|| AppError::Internal("token secret not configured".to_string()))?;
    verify_token(secret, token)
}

/// The authenticated caller. Extraction fails with `Unauthorized` when the
/// `Authorization: Bearer` header is missing or does not verify.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Uuid);

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(match bearer(req) {
            Some(token) => verify_request(req, token).map(Identity),
            None => Err(AppError::Unauthorized),
        })
    }
}

/// Caller identity on endpoints that also serve guests. `None` only when the
/// header is absent; a present-but-invalid token is still `Unauthorized`,
/// never silently downgraded to a guest.
#[derive(Debug, Clone, Copy)]
pub struct MaybeIdentity(pub Option<Uuid>);

impl FromRequest for MaybeIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, AppError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(match bearer(req) {
            Some(token) => verify_request(req, token).map(|id| MaybeIdentity(Some(id))),
            None => Ok(MaybeIdentity(None)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> TokenSecret {
        TokenSecret::new("test-secret")
    }

    #[test]
    fn token_round_trips() {
        let user_id = Uuid::new_v4();
        let token = issue_token(&secret(), user_id, Duration::hours(1));
        assert_eq!(verify_token(&secret(), &token).unwrap(), user_id);
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let token = issue_token(&secret(), Uuid::new_v4(), Duration::hours(1));
        let (_, tag) = token.split_once('.').unwrap();

        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                sub: Uuid::new_v4(),
                exp: (Utc::now() + Duration::hours(1)).timestamp(),
            })
            .unwrap(),
        );
        let forged = format!("{forged_claims}.{tag}");

        assert!(matches!(
            verify_token(&secret(), &forged),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(&secret(), Uuid::new_v4(), Duration::hours(1));
        assert!(verify_token(&TokenSecret::new("other-secret"), &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token(&secret(), Uuid::new_v4(), Duration::seconds(-10));
        assert!(matches!(
            verify_token(&secret(), &token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        for garbage in ["", "no-dot", "a.b", "!!!.###"] {
            assert!(verify_token(&secret(), garbage).is_err(), "{garbage:?}");
        }
    }
}
