use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallerTokenError {
    #[error("token validation failed: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token missing caller identifier")]
    MissingSubject,
    #[error("no signing secret configured")]
    MissingSecret,
}

#[derive(Debug, Serialize, Deserialize)]
struct CallerClaims {
    sub: String,
    exp: u64,
}

/// HS256 bearer tokens whose `sub` claim is the caller id, as minted by the
/// platform's identity service. An empty secret rejects every token.
#[derive(Clone)]
pub struct CallerTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    keyed: bool,
}

impl CallerTokens {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            keyed: !secret.is_empty(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<String, CallerTokenError> {
        if !self.keyed {
            return Err(CallerTokenError::MissingSecret);
        }
        let data = decode::<CallerClaims>(token, &self.decoding, &self.validation)?;
        if data.claims.sub.trim().is_empty() {
            return Err(CallerTokenError::MissingSubject);
        }
        Ok(data.claims.sub)
    }

    pub fn issue(&self, caller_id: &str, ttl: Duration) -> Result<String, CallerTokenError> {
        if !self.keyed {
            return Err(CallerTokenError::MissingSecret);
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let claims = CallerClaims {
            sub: caller_id.to_string(),
            exp: now + ttl.as_secs(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Caller identity carried by the request, if any. Invalid tokens are
    /// treated as absent.
    pub fn caller_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let token = bearer_token(headers)?;
        match self.verify(token) {
            Ok(caller) => Some(caller),
            Err(err) => {
                tracing::debug!(error = %err, "ignoring invalid caller token");
                None
            }
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
