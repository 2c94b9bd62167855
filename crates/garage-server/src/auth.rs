//! Bearer-token authentication.
//!
//! When enabled, protected routes accept either the configured API key or a
//! session token obtained from `POST /api/login`. Session tokens are random
//! UUIDs kept in memory until they expire or are revoked.
//!
//! Password hashes have the form `sha256$<salt>$<hex digest>`, where the
//! digest covers the salt followed by the password.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use chrono::{DateTime, Duration, Utc};
use garage_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HASH_SCHEME: &str = "sha256";

/// Default session lifetime.
pub const DEFAULT_TOKEN_TTL_MINUTES: u64 = 60;

/// A user allowed to log in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Output of [`hash_password`].
    pub password_hash: String,
}

/// `[auth]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require credentials on protected routes.
    pub enabled: bool,

    /// Static bearer token accepted on protected routes.
    pub api_key: Option<String>,

    pub token_ttl_minutes: u64,

    pub users: Vec<UserRecord>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            users: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// # Errors
    /// Returns `Error::Configuration` if auth is enabled without any way to
    /// authenticate, or a stored password hash is malformed.
    pub fn validate(&self) -> Result<()> {
        if self.token_ttl_minutes == 0 {
            return Err(Error::configuration("token_ttl_minutes must be non-zero"));
        }
        if self.api_key.as_deref().is_some_and(str::is_empty) {
            return Err(Error::configuration("api_key must not be empty"));
        }
        if self.enabled && self.api_key.is_none() && self.users.is_empty() {
            return Err(Error::configuration(
                "auth is enabled but neither an api_key nor users are configured",
            ));
        }
        if let Some(user) = self.users.iter().find(|u| parse_hash(&u.password_hash).is_none()) {
            return Err(Error::configuration(format!(
                "password hash of user '{}' is not in {HASH_SCHEME}$<salt>$<digest> form",
                user.username
            )));
        }
        Ok(())
    }
}

fn digest(salt: &str, password: &str) -> Vec<u8> {
    Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize()
        .to_vec()
}

fn parse_hash(stored: &str) -> Option<(&str, Vec<u8>)> {
    let mut parts = stored.splitn(3, '$');
    let scheme = parts.next()?;
    let salt = parts.next()?;
    let expected = hex::decode(parts.next()?).ok()?;
    (scheme == HASH_SCHEME && !salt.is_empty()).then_some((salt, expected))
}

/// Hash a password with a fresh random salt.
#[must_use]
pub fn hash_password(password: &str) -> String {
    hash_password_with_salt(&Uuid::new_v4().simple().to_string(), password)
}

#[must_use]
pub fn hash_password_with_salt(salt: &str, password: &str) -> String {
    format!(
        "{HASH_SCHEME}${salt}${}",
        hex::encode(digest(salt, password))
    )
}

/// Check a password against a stored hash in constant time.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    match parse_hash(stored) {
        Some((salt, expected)) => digest(salt, password).ct_eq(&expected).into(),
        None => false,
    }
}

/// Issued on successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Who a request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Auth is disabled.
    Anonymous,
    ApiKey,
    User { username: String, token: String },
}

#[derive(Debug)]
struct SessionEntry {
    username: String,
    expires_at: DateTime<Utc>,
}

/// Credential checks and the in-memory session table.
#[derive(Debug)]
pub struct Authenticator {
    config: AuthConfig,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Verify a username and password and open a session.
    pub fn login(&self, username: &str, password: &str) -> Option<Session> {
        let user = self.config.users.iter().find(|u| u.username == username);
        let Some(user) = user.filter(|u| verify_password(password, &u.password_hash)) else {
            warn!(username, "login rejected");
            return None;
        };

        let ttl = i64::try_from(self.config.token_ttl_minutes).unwrap_or(i64::MAX);
        let now = Utc::now();
        let lifetime = Duration::try_minutes(ttl).unwrap_or(Duration::MAX);
        let expires_at = now
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let token = Uuid::new_v4().to_string();

        let mut sessions = self.sessions();
        sessions.retain(|_, entry| entry.expires_at > now);
        sessions.insert(
            token.clone(),
            SessionEntry {
                username: user.username.clone(),
                expires_at,
            },
        );
        info!(username, %expires_at, "session opened");

        Some(Session {
            access_token: token,
            token_type: "bearer".to_string(),
            expires_at,
        })
    }

    /// Revoke a session token. Returns `false` if it was not live.
    pub fn logout(&self, token: &str) -> bool {
        let removed = self.sessions().remove(token);
        if let Some(entry) = &removed {
            info!(username = %entry.username, "session closed");
        }
        removed.is_some_and(|entry| entry.expires_at > Utc::now())
    }

    /// Decide whether a request carrying `token` may proceed.
    ///
    /// # Errors
    /// Returns `ApiError::Unauthorized` when auth is enabled and the token is
    /// missing, unknown or expired.
    pub fn authenticate(&self, token: Option<&str>) -> std::result::Result<Principal, ApiError> {
        if !self.config.enabled {
            return Ok(Principal::Anonymous);
        }
        let token = token.ok_or(ApiError::Unauthorized("missing bearer token"))?;

        if let Some(key) = &self.config.api_key
            && bool::from(key.as_bytes().ct_eq(token.as_bytes()))
        {
            return Ok(Principal::ApiKey);
        }

        let mut sessions = self.sessions();
        match sessions.get(token) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Principal::User {
                username: entry.username.clone(),
                token: token.to_string(),
            }),
            Some(_) => {
                sessions.remove(token);
                debug!("expired session token presented");
                Err(ApiError::Unauthorized("session expired"))
            }
            None => Err(ApiError::Unauthorized("invalid bearer token")),
        }
    }
}

/// Bearer token from an `Authorization` header, if any.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Extractor for routes that require authentication when it is enabled.
#[derive(Debug, Clone)]
pub struct Authorized(pub Principal);

impl FromRequestParts<AppState> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        state
            .auth
            .authenticate(bearer_token(&parts.headers))
            .map(Authorized)
    }
}
