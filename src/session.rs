use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const TOKEN_LIFETIME_SECS: i64 = 60 * 60;

#[derive(Serialize, Deserialize, Debug)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Signing keys for stateless HS256 bearer tokens carrying the user id.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        SessionKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: u64) -> Result<String, AppError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: u64, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AppError::Internal(format!("token signing failed: {}", err)))
    }

    pub fn verify(&self, token: &str) -> Result<u64, AppError> {
        self.verify_at(token, Utc::now())
    }

    /// Returns the user id carried by `token`. Expiry is checked against
    /// `now` with no leeway.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AppError::Unauthorized)?
            .claims;
        if now.timestamp() >= claims.exp {
            return Err(AppError::Unauthorized);
        }
        claims.sub.parse().map_err(|_| AppError::Unauthorized)
    }
}

/// The id of the user presenting a valid `Authorization: Bearer` token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub u64);

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    let keys = req
        .app_data::<web::Data<SessionKeys>>()
        .ok_or_else(|| AppError::Internal("session keys not configured".to_owned()))?;
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;
    keys.verify(token.trim()).map(AuthenticatedUser)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn keys() -> SessionKeys {
        SessionKeys::new("test-secret")
    }

    #[test]
    fn token_is_valid_for_one_hour() {
        let keys = keys();
        let issued = Utc::now();
        let token = keys.issue_at(42, issued).unwrap();
        assert_eq!(keys.verify_at(&token, issued).unwrap(), 42);
        assert_eq!(
            keys.verify_at(&token, issued + Duration::seconds(TOKEN_LIFETIME_SECS - 1))
                .unwrap(),
            42
        );
        assert!(matches!(
            keys.verify_at(&token, issued + Duration::seconds(TOKEN_LIFETIME_SECS)),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn rejects_foreign_and_tampered_tokens() {
        let token = keys().issue(7).unwrap();
        assert!(SessionKeys::new("other-secret").verify(&token).is_err());

        // Claims of a token signed by another key, spliced under ours.
        let foreign = SessionKeys::new("other-secret").issue(1).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = foreign.split('.').nth(1).unwrap();
        assert!(keys().verify(&parts.join(".")).is_err());

        let wrong_algorithm = encode(
            &Header::new(Algorithm::HS512),
            &Claims {
                sub: "1".to_owned(),
                iat: 0,
                exp: i64::MAX,
            },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(keys().verify(&wrong_algorithm).is_err());

        assert!(keys().verify("").is_err());
        assert!(keys().verify("a.b").is_err());
        assert!(keys().verify(&format!("{}.extra", token)).is_err());
    }

    #[test]
    fn extractor_reads_bearer_header() {
        let keys = web::Data::new(keys());
        let token = keys.issue(9).unwrap();

        let req = TestRequest::default()
            .app_data(keys.clone())
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_http_request();
        assert_eq!(authenticate(&req).unwrap().0, 9);

        let req = TestRequest::default()
            .app_data(keys.clone())
            .insert_header((header::AUTHORIZATION, token))
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(AppError::Unauthorized)));

        let req = TestRequest::default().app_data(keys).to_http_request();
        assert!(matches!(authenticate(&req), Err(AppError::Unauthorized)));
    }
}
