use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Kind of access token held by a set of credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    /// Issued to the application itself (client-credentials grant)
    AppAccessToken,
    /// Issued on behalf of a user (implicit or authorization-code grant)
    UserAccessToken,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::AppAccessToken => write!(f, "app"),
            TokenType::UserAccessToken => write!(f, "user"),
        }
    }
}

/// Validated credentials for the Twitch API.
///
/// Values are only ever produced by a successful validation, so `auth_token` is never
/// empty. Failures are reported through [`crate::AuthError`] instead.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The access token used for API requests
    pub auth_token: String,

    /// Refresh token, only present for the authorization-code grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Client id the token was issued to
    pub client_id: String,

    /// Login name of the user (empty for app tokens)
    #[serde(default)]
    pub login: String,

    /// User id (empty for app tokens)
    #[serde(default)]
    pub user_id: String,

    /// The permissions granted to this token
    #[serde(default)]
    pub scopes: BTreeSet<String>,

    /// Remaining lifetime reported by the validation that produced this value
    pub expires_in_seconds: i64,

    /// When that validation happened
    pub validation_timestamp: DateTime<Utc>,

    pub token_type: TokenType,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &crate::common::mask_token(&self.auth_token))
            .field("has_refresh_token", &self.has_refresh_token())
            .field("client_id", &self.client_id)
            .field("login", &self.login)
            .field("user_id", &self.user_id)
            .field("scopes", &self.scopes)
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("validation_timestamp", &self.validation_timestamp)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl Credentials {
    /// When the access token expires.
    ///
    /// Always derived from the validation timestamp, because `expires_in_seconds` is only
    /// meaningful relative to the validation call that returned it. Lifetimes past the
    /// representable range clamp to its ends.
    pub fn expiration_instant(&self) -> DateTime<Utc> {
        let clamped = if self.expires_in_seconds >= 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        };
        Duration::try_seconds(self.expires_in_seconds)
            .and_then(|lifetime| self.validation_timestamp.checked_add_signed(lifetime))
            .unwrap_or(clamped)
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.expiration_instant() <= Utc::now()
    }

    /// Check if the token will expire within the given window
    pub fn expires_within(&self, window: std::time::Duration) -> bool {
        match Duration::from_std(window) {
            Ok(window) => self.expiration_instant() - Utc::now() < window,
            Err(_) => true,
        }
    }

    /// Calculate seconds until expiration (negative once expired)
    pub fn seconds_until_expiration(&self) -> i64 {
        (self.expiration_instant() - Utc::now()).num_seconds()
    }

    /// Whether a non-empty refresh token is attached
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }

    /// Authorization header value for Helix endpoint requests
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.auth_token)
    }

    /// Attach the refresh token returned alongside the access token
    pub(crate) fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token.filter(|token| !token.trim().is_empty());
        self
    }
}
