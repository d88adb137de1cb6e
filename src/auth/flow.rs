//! The Twitch grant flows: implicit, authorization code (front and back halves),
//! client credentials and refresh.
//!
//! Every flow runs its steps strictly in sequence and stops at the first failure. Nothing
//! is retried and no state survives the call.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::authority::{describe_error_body, grant_type_of, TokenAuthority};
use crate::auth::browser::{BrowserLauncher, SystemBrowser};
use crate::auth::credentials::{Credentials, TokenType};
use crate::auth::listener::{bind_redirect_listener, normalize_redirect_uri};
use crate::auth::nonce::generate_nonce;
use crate::common::constant_time_eq;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

// Response type for token requests
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<Vec<String>>,
    #[serde(default)]
    token_type: Option<String>,
}

/// State owned by a single browser flow invocation
#[derive(Debug, Clone)]
struct PendingAuthorization {
    state: String,
    scopes: Vec<String>,
    redirect_uri: String,
}

/// Entry points for acquiring and renewing Twitch credentials
#[derive(Clone)]
pub struct OAuthFlows {
    authority: TokenAuthority,
    browser: Arc<dyn BrowserLauncher>,
}

impl OAuthFlows {
    /// Create flows that open the system browser
    pub fn new(authority: TokenAuthority) -> Self {
        Self::with_browser(authority, Arc::new(SystemBrowser))
    }

    /// Create flows against the authority named in `config`
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        Ok(Self::new(TokenAuthority::from_config(config)?))
    }

    pub fn with_browser(authority: TokenAuthority, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self { authority, browser }
    }

    pub fn authority(&self) -> &TokenAuthority {
        &self.authority
    }

    /// Implicit grant: the token comes back in the redirect fragment and is validated
    /// before it is returned.
    pub async fn implicit(&self, config: &AuthConfig) -> AuthResult<Credentials> {
        let flow_id = Uuid::new_v4();
        info!(flow = "implicit", %flow_id, "Starting implicit grant flow");

        let params = self.capture_redirect(config, "token", flow_id).await?;
        if let Some(error) = redirect_error(&params) {
            return Err(error);
        }
        let access_token = required_param(&params, "access_token")?;
        required_param(&params, "token_type")?;

        let credentials = self
            .authority
            .validate(access_token, TokenType::UserAccessToken)
            .await?;

        info!(flow = "implicit", %flow_id, login = %credentials.login, "Implicit grant flow completed");
        Ok(credentials)
    }

    /// Front half of the authorization-code grant: capture consent and return the code.
    ///
    /// Never talks to the token endpoint; the code is meant for a back end holding the
    /// client secret.
    pub async fn authorization_code_front_end(&self, config: &AuthConfig) -> AuthResult<String> {
        let flow_id = Uuid::new_v4();
        info!(flow = "authorization_code", %flow_id, "Starting authorization code capture");

        let params = self.capture_redirect(config, "code", flow_id).await?;
        if let Some(error) = redirect_error(&params) {
            return Err(error);
        }
        let code = required_param(&params, "code")?.to_string();

        info!(flow = "authorization_code", %flow_id, "Authorization code captured");
        Ok(code)
    }

    /// Back half of the authorization-code grant: trade the code for tokens
    pub async fn authorization_code_exchange(
        &self,
        config: &AuthConfig,
        code: &str,
        client_secret: &str,
    ) -> AuthResult<Credentials> {
        let flow_id = Uuid::new_v4();
        info!(flow = "authorization_code_exchange", %flow_id, "Exchanging authorization code");

        require_client_id(config)?;
        require_secret(client_secret)?;
        if code.trim().is_empty() {
            return Err(AuthError::parameter_validation(
                "Authorization code is null or empty",
            ));
        }

        let redirect_uri = normalize_redirect_uri(&config.redirect_uri);
        let token = self
            .request_token(&[
                ("client_id", config.client_id.as_str()),
                ("client_secret", client_secret),
                ("code", code.trim()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .await?;

        let credentials = self
            .authority
            .validate(&token.access_token, TokenType::UserAccessToken)
            .await?
            .with_refresh_token(token.refresh_token);

        info!(
            flow = "authorization_code_exchange",
            %flow_id,
            login = %credentials.login,
            has_refresh_token = credentials.has_refresh_token(),
            "Authorization code exchanged"
        );
        Ok(credentials)
    }

    /// Client-credentials grant: an app access token, never with a refresh token
    pub async fn client_credentials(
        &self,
        config: &AuthConfig,
        client_secret: &str,
    ) -> AuthResult<Credentials> {
        let flow_id = Uuid::new_v4();
        info!(flow = "client_credentials", %flow_id, "Requesting app access token");

        require_client_id(config)?;
        require_secret(client_secret)?;

        let scope = config.scopes.join(" ");
        let mut form = vec![
            ("client_id", config.client_id.as_str()),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        let token = self.request_token(&form).await?;
        let credentials = self
            .authority
            .validate(&token.access_token, TokenType::AppAccessToken)
            .await?;

        info!(flow = "client_credentials", %flow_id, "App access token issued");
        Ok(credentials)
    }

    /// Use the refresh token in `credentials` to obtain a new user access token
    pub async fn refresh(
        &self,
        credentials: &Credentials,
        client_secret: &str,
    ) -> AuthResult<Credentials> {
        let flow_id = Uuid::new_v4();
        info!(flow = "refresh", %flow_id, login = %credentials.login, "Refreshing user access token");

        let refresh_token = match credentials.refresh_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => {
                warn!(flow = "refresh", %flow_id, "No refresh token available");
                return Err(AuthError::credential_state("Refresh Token is null or empty"));
            }
        };
        require_secret(client_secret)?;

        let token = self
            .request_token(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", client_secret),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        // Twitch rotates refresh tokens, but keep the old one if none came back
        let next_refresh = token
            .refresh_token
            .or_else(|| Some(refresh_token.to_string()));
        let refreshed = self
            .authority
            .validate(&token.access_token, TokenType::UserAccessToken)
            .await?
            .with_refresh_token(next_refresh);

        info!(flow = "refresh", %flow_id, expires_in = refreshed.expires_in_seconds, "Access token refreshed");
        Ok(refreshed)
    }

    /// Bind the listener, open the consent page and return the redirect's parameters once
    /// the state has been checked.
    async fn capture_redirect(
        &self,
        config: &AuthConfig,
        response_type: &str,
        flow_id: Uuid,
    ) -> AuthResult<HashMap<String, String>> {
        require_client_id(config)?;

        let listener = bind_redirect_listener(&config.redirect_uri).await?;
        let pending = PendingAuthorization {
            state: generate_nonce(),
            scopes: config.scopes.clone(),
            redirect_uri: listener.redirect_uri().to_string(),
        };

        let authorize_url = self.authorize_url(config, &pending, response_type)?;
        debug!(%flow_id, response_type, scopes = ?pending.scopes, "Opening consent page");
        if let Err(e) = self.browser.open(&authorize_url) {
            warn!(
                %flow_id,
                error = %e,
                url = %authorize_url,
                "Could not open browser, visit the URL manually"
            );
        }

        let captured = listener
            .wait_for_redirect(config.redirect_timeout())
            .await?;
        debug!(%flow_id, "Redirect captured, checking parameters");

        let params = parse_redirect_params(&captured)?;
        check_state(&params, &pending.state)?;
        Ok(params)
    }

    fn authorize_url(
        &self,
        config: &AuthConfig,
        pending: &PendingAuthorization,
        response_type: &str,
    ) -> AuthResult<String> {
        let mut url = Url::parse(&self.authority.authorize_url()).map_err(|e| {
            AuthError::parameter_validation(format!("Invalid authority URL: {e}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", &pending.redirect_uri)
                .append_pair("response_type", response_type)
                .append_pair("scope", &pending.scopes.join(" "))
                .append_pair("state", &pending.state);
            if config.force_verify {
                query.append_pair("force_verify", "true");
            }
        }
        Ok(url.to_string())
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        let grant_type = grant_type_of(form);

        let response = self.authority.exchange(form).await.ok_or_else(|| {
            AuthError::transport(format!("No response from token endpoint ({grant_type})"))
        })?;

        if !response.is_success() {
            let detail = describe_error_body(response.body());
            warn!(grant_type, status = response.status(), detail = %detail, "Token request failed");
            return Err(AuthError::transport(format!(
                "Token request ({grant_type}) failed: HTTP {}: {detail}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().map_err(|e| {
            AuthError::deserialization(format!("Failed to parse token response: {e}"))
        })?;
        if token.access_token.trim().is_empty() {
            return Err(AuthError::deserialization(
                "Token response has no access_token",
            ));
        }

        debug!(
            grant_type,
            token_type = token.token_type.as_deref().unwrap_or(""),
            expires_in = ?token.expires_in,
            scopes = ?token.scope,
            "Token endpoint issued a token"
        );
        Ok(token)
    }
}

fn require_client_id(config: &AuthConfig) -> AuthResult<()> {
    if config.client_id.trim().is_empty() {
        return Err(AuthError::parameter_validation("Client ID is null or empty"));
    }
    Ok(())
}

fn require_secret(client_secret: &str) -> AuthResult<()> {
    if client_secret.trim().is_empty() {
        return Err(AuthError::parameter_validation(
            "Client secret is null or empty",
        ));
    }
    Ok(())
}

fn parse_redirect_params(captured: &str) -> AuthResult<HashMap<String, String>> {
    let url = Url::parse(captured)
        .map_err(|e| AuthError::parameter_validation(format!("Malformed redirect URL: {e}")))?;
    Ok(url.query_pairs().into_owned().collect())
}

fn check_state(params: &HashMap<String, String>, expected: &str) -> AuthResult<()> {
    let Some(state) = params.get("state").filter(|s| !s.is_empty()) else {
        return Err(AuthError::parameter_validation(
            "Redirect is missing the state parameter",
        ));
    };
    if !constant_time_eq(state.as_bytes(), expected.as_bytes()) {
        warn!("Redirect state does not match the generated nonce");
        return Err(AuthError::parameter_validation(
            "State parameter does not match (possible CSRF or stale redirect)",
        ));
    }
    Ok(())
}

fn redirect_error(params: &HashMap<String, String>) -> Option<AuthError> {
    let error = params.get("error")?;
    let description = params
        .get("error_description")
        .map(String::as_str)
        .unwrap_or("");
    warn!(error = %error, description, "Authority redirected with an error");
    let message = if description.is_empty() {
        format!("Authorization was denied: {error}")
    } else {
        format!("Authorization was denied: {error} ({description})")
    };
    Some(AuthError::parameter_validation(message))
}

fn required_param<'a>(params: &'a HashMap<String, String>, name: &str) -> AuthResult<&'a str> {
    params
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AuthError::parameter_validation(format!("Redirect is missing the {name} parameter"))
        })
}
