//! Identity checks for browser sessions and headless clients.
//!
//! [`AuthGateway::authenticate`] is the single entry point. A request carrying
//! `Authorization: Bearer <token>` is checked by [`BearerAuth`]; anything else
//! falls back to the signed session cookie checked by [`SessionAuth`]. Either
//! way the caller only ever sees the pseudonymous hash; raw emails stay inside
//! this module.

pub mod handlers;
pub mod provider;
pub mod session;
pub mod token;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{HeaderValue, AUTHORIZATION};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::AppError;
use crate::state::AppState;

pub use provider::{IdentityProvider, OidcClient, OidcProvider, UserProfile};
pub use session::CookieSigner;
pub use token::TokenIssuer;

/// Hash reported for every request when authentication is disabled.
pub const ANONYMOUS_HASH: &str = "unknown";

pub const USER_SESSION: &str = "user_session";
pub const LOGIN_SESSION: &str = "login_session";

/// Anti-forgery cookie lifetime during the login round trip.
pub const LOGIN_SESSION_MAX_AGE: Duration = Duration::from_secs(600);
/// Authenticated session lifetime.
pub const USER_SESSION_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No usable credential was presented.
    #[error("not authenticated: {0}")]
    Unauthorized(String),

    /// A bearer token was presented but failed verification.
    #[error("invalid bearer token: {0}")]
    InvalidToken(String),

    #[error("invalid oauth state")]
    StateMismatch,

    /// Valid credential, but the identity is not on the allow-list.
    #[error("user {email} is not authorized")]
    Forbidden { email: String },

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("signing error: {0}")]
    Signing(String),
}

/// Salted one-way digest of an identity (hex SHA-224 of salt || id).
pub fn hash_identity(salt: &str, id: &str) -> String {
    let mut hasher = Sha224::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Contents of the long-lived session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSession {
    pub hash: String,
    pub email: String,
}

/// Contents of the short-lived anti-forgery cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    pub oauth_state: String,
}

/// Interactive login: signed cookies plus an external identity provider.
pub struct SessionAuth {
    pub cookies: CookieSigner,
    pub provider: Arc<dyn IdentityProvider>,
}

/// Stateless bearer tokens for non-browser clients.
pub struct BearerAuth {
    pub tokens: TokenIssuer,
}

/// A completed login: the cookie to set and the hash it carries.
#[derive(Debug)]
pub struct SessionGrant {
    pub cookie: HeaderValue,
    pub hash: String,
}

pub struct AuthGateway {
    salt: String,
    allowed_users: HashSet<String>,
    session: Option<SessionAuth>,
    bearer: Option<BearerAuth>,
}

impl AuthGateway {
    pub fn new(
        salt: impl Into<String>,
        allowed_users: HashSet<String>,
        session: Option<SessionAuth>,
        bearer: Option<BearerAuth>,
    ) -> Self {
        Self {
            salt: salt.into(),
            allowed_users,
            session,
            bearer,
        }
    }

    /// Gateway that accepts everything as [`ANONYMOUS_HASH`].
    pub fn disabled() -> Self {
        Self::new(String::new(), HashSet::new(), None, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.session.is_some() || self.bearer.is_some()
    }

    pub fn session(&self) -> Option<&SessionAuth> {
        self.session.as_ref()
    }

    pub fn bearer(&self) -> Option<&BearerAuth> {
        self.bearer.as_ref()
    }

    pub fn hash(&self, id: &str) -> String {
        hash_identity(&self.salt, id)
    }

    /// An empty allow-list means authentication only, no authorization.
    pub fn is_allowed(&self, email: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(email)
    }

    /// Resolve the pseudonymous hash of the caller.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        if !self.is_enabled() {
            return Ok(ANONYMOUS_HASH.to_string());
        }

        if let Some(bearer) = &self.bearer {
            if let Some(token) = bearer_token(headers) {
                let subject = bearer.tokens.verify(token)?;
                if !self.is_allowed(&subject) {
                    return Err(AuthError::Forbidden { email: subject });
                }
                debug!("Authenticated via bearer token");
                return Ok(self.hash(&subject));
            }
        }

        if self.session.is_none() {
            return Err(AuthError::Unauthorized("missing bearer token".into()));
        }
        let user = self
            .read_user_session(headers)
            .ok_or_else(|| AuthError::Unauthorized("no valid session".into()))?;
        if user.hash.is_empty() {
            return Err(AuthError::Unauthorized("empty session".into()));
        }
        Ok(user.hash)
    }

    /// Decode the session cookie, if present and correctly signed.
    pub fn read_user_session(&self, headers: &HeaderMap) -> Option<UserSession> {
        let auth = self.session.as_ref()?;
        let raw = session::read_cookie(headers, USER_SESSION)?;
        auth.cookies.open(raw)
    }

    /// Final step of the interactive login once the provider has vouched for
    /// `email`: enforce the allow-list and mint the session cookie.
    pub fn complete_login(&self, email: &str) -> Result<SessionGrant, AuthError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| AuthError::Unauthorized("interactive login is disabled".into()))?;
        if !self.is_allowed(email) {
            info!("Login rejected by allow-list");
            return Err(AuthError::Forbidden {
                email: email.to_string(),
            });
        }

        let hash = self.hash(email);
        let value = UserSession {
            hash: hash.clone(),
            email: email.to_string(),
        };
        let sealed = session.cookies.seal(&value, USER_SESSION_MAX_AGE)?;
        let cookie = session
            .cookies
            .set_cookie(USER_SESSION, &sealed, USER_SESSION_MAX_AGE, true)?;
        Ok(SessionGrant { cookie, hash })
    }

    /// Issue a bearer token for a browser-authenticated user.
    pub fn issue_token(&self, subject: &str) -> Result<Option<String>, AuthError> {
        match &self.bearer {
            Some(bearer) => bearer.tokens.issue(subject).map(Some),
            None => Ok(None),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(AUTHORIZATION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Pseudonymous hash of the authenticated caller.
///
/// Use as an extractor in handlers that require an identity; rejects with 401
/// or 403 before the handler body runs.
#[derive(Debug, Clone)]
pub struct UserHash(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for UserHash {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let hash = state.auth.authenticate(&parts.headers).map_err(|e| match e {
            // bearer-only deployments have no /login to offer
            AuthError::Unauthorized(_) | AuthError::InvalidToken(_) if state.auth.session().is_none() => {
                AppError::BearerRequired(e.to_string())
            }
            other => other.into(),
        })?;
        Ok(UserHash(hash))
    }
}
