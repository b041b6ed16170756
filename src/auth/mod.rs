//! Request authentication and authorization
//!
//! Two methods are supported, selected by `api.auth_type`:
//!
//! | Method | Header | Context |
//! |--------|--------|---------|
//! | basic | `Basic <base64(user:password)>` | [`AuthContext::Administrator`] |
//! | oauth2 | `Bearer <access token>` | [`AuthContext::User`] with the token scopes |
//!
//! OAuth2 users may only reach public endpoints and the endpoints named in
//! their token scope.

mod token;

pub use token::*;

use crate::config::{AuthType, BasicUser};
use crate::error::{ApiError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Endpoints every authenticated client may call
pub const PUBLIC_ENDPOINTS: [&str; 6] = ["auth", "token", "welcome", "catalog", "dbsize", "directors"];

static AUTHORIZATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+ [\w=+/]+$").expect("valid authorization pattern"));

/// Identity a request runs under
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// Basic auth user, unrestricted
    Administrator,
    /// OAuth2 client restricted to its scopes
    User {
        /// OAuth2 client identifier
        client_id: String,
        /// Allowed endpoint names
        scopes: Vec<String>,
        /// Console configuration to use instead of the default one
        console_cfg: Option<PathBuf>,
    },
}

impl AuthContext {
    /// Whether the context is unrestricted
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Administrator)
    }

    /// Per-request console configuration
    pub fn console_cfg(&self) -> Option<&Path> {
        match self {
            Self::Administrator => None,
            Self::User { console_cfg, .. } => console_cfg.as_deref(),
        }
    }
}

/// Resolves the `Authorization` header to an [`AuthContext`]
pub struct Authenticator {
    auth_type: AuthType,
    users: Vec<BasicUser>,
    tokens: Arc<dyn TokenStore>,
}

impl Authenticator {
    /// Create an authenticator
    pub fn new(auth_type: AuthType, users: Vec<BasicUser>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            auth_type,
            users,
            tokens,
        }
    }

    /// Authenticate a request from its `Authorization` header value
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthContext> {
        let header = header.map(str::trim).ok_or(ApiError::Authentication)?;
        if !AUTHORIZATION_PATTERN.is_match(header) {
            return Err(ApiError::Authentication);
        }
        let (scheme, credentials) = header.split_once(' ').ok_or(ApiError::Authentication)?;

        match (self.auth_type, scheme) {
            (AuthType::Basic, "Basic") => {
                if self.check_basic(credentials) {
                    Ok(AuthContext::Administrator)
                } else {
                    Err(ApiError::Authentication)
                }
            }
            (AuthType::OAuth2, "Bearer") => {
                self.tokens.delete_expired(Utc::now().timestamp())?;
                let record = self
                    .tokens
                    .find(credentials)?
                    .ok_or(ApiError::Authentication)?;
                Ok(AuthContext::User {
                    scopes: record.scopes(),
                    client_id: record.client_id,
                    console_cfg: record.console_cfg_path.filter(|p| !p.as_os_str().is_empty()),
                })
            }
            _ => Err(ApiError::Authentication),
        }
    }

    fn check_basic(&self, credentials: &str) -> bool {
        let Ok(decoded) = STANDARD.decode(credentials) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((username, password)) = decoded.split_once(':') else {
            return false;
        };
        let hash = hash_password(password);
        self.users
            .iter()
            .any(|u| u.username == username && u.password_sha256.eq_ignore_ascii_case(&hash))
    }
}

/// Check that `context` may call the endpoint at `path`.
///
/// The path must look like `/api/<endpoint>/...`; `<endpoint>` has to be
/// public or one of the user's scopes.
pub fn authorize(context: &AuthContext, path: &str) -> Result<()> {
    let scopes = match context {
        AuthContext::Administrator => return Ok(()),
        AuthContext::User { scopes, .. } => scopes,
    };

    let parts: Vec<&str> = path.split('/').collect();
    let allowed = parts.len() >= 3
        && parts[1] == "api"
        && (PUBLIC_ENDPOINTS.contains(&parts[2]) || scopes.iter().any(|s| s == parts[2]));

    if allowed {
        Ok(())
    } else {
        Err(ApiError::NotAllowedResource(path.to_string()))
    }
}

/// Hex SHA-256 of a password, as stored in `basic_users`
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
