//! Bearer token verification.
//!
//! Tokens are HS256 JWTs carrying the caller's privilege names. Granting privileges is
//! someone else's job; this module only mints tokens for operators and reads them back.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::core::shared::state::AppState;
use crate::okr::error::{OkrError, OkrResult};
use crate::okr::visibility::{ACCESS_PRIVILEGES, VIEW_USERS};

const MIN_SECRET_LEN: usize = 32;
const BOOTSTRAP_SUBJECT: &str = "bootstrap";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub privileges: Vec<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
    ephemeral: bool,
}

impl TokenService {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl_minutes: i64) -> OkrResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(OkrError::validation(format!(
                "JWT secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }
        let ttl = Duration::try_minutes(ttl_minutes.max(1)).ok_or_else(|| {
            OkrError::validation(format!("token ttl of {ttl_minutes} minutes is out of range"))
        })?;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl,
            ephemeral: false,
        })
    }

    /// Without a configured secret the tokens only live as long as this process.
    /// Use [`TokenService::bootstrap_token`] to obtain one.
    pub fn from_config(config: &AuthConfig) -> OkrResult<Self> {
        match config.jwt_secret.as_deref() {
            Some(secret) => Self::new(secret, config.issuer.clone(), config.token_ttl_minutes),
            None => {
                warn!("auth.jwt_secret is not set, generating an ephemeral signing secret");
                let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
                let mut tokens = Self::new(&secret, config.issuer.clone(), config.token_ttl_minutes)?;
                tokens.ephemeral = true;
                Ok(tokens)
            }
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// An all-privileges token for operators of a server whose secret is ephemeral.
    /// With a configured secret, `issue-token` is the way in and this returns `None`.
    pub fn bootstrap_token(&self) -> OkrResult<Option<String>> {
        if !self.ephemeral {
            return Ok(None);
        }
        let privileges = [VIEW_USERS.to_string(), ACCESS_PRIVILEGES.to_string()];
        self.issue(BOOTSTRAP_SUBJECT, &privileges).map(Some)
    }

    pub fn issue(&self, subject: &str, privileges: &[String]) -> OkrResult<String> {
        let now = Utc::now();
        let expires = now.checked_add_signed(self.ttl).ok_or_else(|| {
            OkrError::validation("token expiry is past the representable date range")
        })?;
        let claims = Claims {
            sub: subject.to_string(),
            privileges: privileges.to_vec(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| OkrError::Storage(format!("Failed to encode token: {e}")))
    }

    pub fn verify(&self, token: &str) -> OkrResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| OkrError::Unauthorized(format!("invalid token: {e}")))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// The verified caller of a request.
#[derive(Debug, Clone)]
pub struct CallerPrivileges {
    pub subject: String,
    pub privileges: BTreeSet<String>,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CallerPrivileges {
    type Rejection = OkrError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| OkrError::Unauthorized("missing bearer token".to_string()))?;
        let claims = state.tokens.verify(token)?;
        Ok(Self {
            subject: claims.sub,
            privileges: claims.privileges.into_iter().collect(),
        })
    }
}
