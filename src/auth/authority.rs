use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::credentials::{Credentials, TokenType};
use crate::common::mask_token;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};

const ERROR_SNIPPET_CHARS: usize = 240;

// Response for validation requests. Twitch omits login/user_id for app tokens and may
// report failure in-band through `status`.
#[derive(Debug, Clone, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Stateless client for the Twitch OAuth authority (`/authorize`, `/token`, `/validate`,
/// `/revoke`).
#[derive(Clone)]
pub struct TokenAuthority {
    /// Base URL without trailing slash, e.g. `https://id.twitch.tv/oauth2`
    base_url: String,
    /// HTTP client for authority requests
    http_client: Arc<dyn HttpClient>,
}

impl TokenAuthority {
    /// Create an authority client backed by reqwest
    pub fn new(base_url: impl Into<String>) -> AuthResult<Self> {
        let http_client = ReqwestHttpClient::new()
            .map_err(|e| AuthError::transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_http_client(base_url, Arc::new(http_client)))
    }

    /// Create an authority client for the configured authority URL
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        Self::new(config.authority_url.clone())
    }

    /// Create an authority client with a custom HTTP client
    pub fn with_http_client(base_url: impl Into<String>, http_client: Arc<dyn HttpClient>) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        Self {
            base_url,
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.base_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_url)
    }

    pub fn validate_url(&self) -> String {
        format!("{}/validate", self.base_url)
    }

    pub fn revoke_url(&self) -> String {
        format!("{}/revoke", self.base_url)
    }

    /// Validate a token and build credentials from the authority's answer
    pub async fn validate(&self, token: &str, token_type: TokenType) -> AuthResult<Credentials> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::credential_state("Access token is null or empty"));
        }

        // Twitch expects the `OAuth` prefix here, not `Bearer`
        let request =
            HttpRequest::get(self.validate_url()).header("Authorization", format!("OAuth {token}"));

        let response = match self.http_client.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(token = %mask_token(token), error = %e, "Token validation request failed");
                return Err(AuthError::transport(format!(
                    "Token validation request failed: {e}"
                )));
            }
        };

        if !response.is_success() {
            let detail = describe_error_body(response.body());
            warn!(
                token = %mask_token(token),
                status = response.status(),
                detail = %detail,
                "Token validation returned non-success status"
            );
            return Err(AuthError::transport(format!(
                "Token validation failed: HTTP {}: {}",
                response.status(),
                detail
            )));
        }

        let validated: ValidateResponse = response.json().map_err(|e| {
            AuthError::deserialization(format!("Failed to parse validation response: {e}"))
        })?;

        if let Some(status) = validated.status.filter(|s| *s != 200 && *s != 0) {
            let message = validated.message.unwrap_or_default();
            warn!(status, message = %message, "Authority rejected token in-band");
            return Err(AuthError::authority_rejection(format!(
                "Token validation rejected with status {status}: {message}"
            )));
        }

        debug!(
            login = validated.login.as_deref().unwrap_or(""),
            expires_in = validated.expires_in,
            token_type = %token_type,
            "Successfully validated Twitch token"
        );

        Ok(Credentials {
            auth_token: token.to_string(),
            refresh_token: None,
            client_id: validated.client_id,
            login: validated.login.unwrap_or_default(),
            user_id: validated.user_id.unwrap_or_default(),
            scopes: validated.scopes.unwrap_or_default().into_iter().collect(),
            expires_in_seconds: validated.expires_in,
            validation_timestamp: Utc::now(),
            token_type,
        })
    }

    /// POST form parameters to the token endpoint.
    ///
    /// Returns the raw response for the caller to interpret, or `None` when the request
    /// could not be sent at all.
    pub async fn exchange(&self, form: &[(&str, &str)]) -> Option<HttpResponse> {
        let grant_type = grant_type_of(form);
        let request = HttpRequest::post_form(self.token_url(), form);
        match self.http_client.send(request).await {
            Ok(response) => {
                debug!(grant_type, status = response.status(), "Token endpoint responded");
                Some(response)
            }
            Err(e) => {
                warn!(grant_type, error = %e, "Token endpoint request failed");
                None
            }
        }
    }

    /// Revoke an access token
    pub async fn revoke(&self, client_id: &str, token: &str) -> AuthResult<()> {
        let request =
            HttpRequest::post_form(self.revoke_url(), &[("client_id", client_id), ("token", token)]);

        let response = self
            .http_client
            .send(request)
            .await
            .map_err(|e| AuthError::transport(format!("Token revocation request failed: {e}")))?;

        if !response.is_success() {
            return Err(AuthError::transport(format!(
                "Failed to revoke token: HTTP {}: {}",
                response.status(),
                describe_error_body(response.body())
            )));
        }

        debug!(token = %mask_token(token), "Successfully revoked Twitch token");
        Ok(())
    }
}

/// The `grant_type` field of a token request, for logs and error messages
pub(crate) fn grant_type_of<'a>(form: &[(&str, &'a str)]) -> &'a str {
    form.iter()
        .find(|(key, _)| *key == "grant_type")
        .map(|(_, value)| *value)
        .unwrap_or("unknown")
}

/// Pull a readable message out of an authority error body.
///
/// Twitch answers with `{"status":400,"message":"..."}`; standard OAuth errors use
/// `error`/`error_description`. Anything else is truncated.
pub(crate) fn describe_error_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        if let Some(message) = field("message").or_else(|| field("error_description")) {
            return message;
        }
        if let Some(error) = field("error") {
            return error;
        }
    }
    body.trim().chars().take(ERROR_SNIPPET_CHARS).collect()
}
