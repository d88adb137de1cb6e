use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

// Default configuration values
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/";
pub const DEFAULT_AUTHORITY_URL: &str = "https://id.twitch.tv/oauth2";

/// Configuration passed explicitly into every grant flow
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Application client id registered with Twitch
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Application client secret; only the back end should ever hold this
    #[serde(skip, default = "default_client_secret")]
    pub client_secret: Option<String>,
    /// Loopback URI the browser is redirected to after consent
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Base URL of the OAuth authority (`.../oauth2`)
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    /// Scopes requested by the browser flows
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Ask the authority to show the consent screen even if already authorized
    #[serde(default = "default_force_verify")]
    pub force_verify: bool,
    /// Give up waiting for the browser after this many milliseconds (unbounded when unset)
    #[serde(default = "default_redirect_timeout_ms")]
    pub redirect_timeout_ms: Option<u64>,
}

fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .filter(|val| !val.trim().is_empty())
        .and_then(|val| val.trim().parse().ok())
}

fn default_client_id() -> String {
    env_value("TWITCH_CLIENT_ID").unwrap_or_default()
}

fn default_client_secret() -> Option<String> {
    env_value("TWITCH_CLIENT_SECRET")
}

fn default_redirect_uri() -> String {
    env_value("TWITCH_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string())
}

fn default_authority_url() -> String {
    env_value("TWITCH_AUTHORITY_URL").unwrap_or_else(|| DEFAULT_AUTHORITY_URL.to_string())
}

fn default_scopes() -> Vec<String> {
    env_value::<String>("TWITCH_SCOPES")
        .map(|val| val.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn default_force_verify() -> bool {
    env_value("TWITCH_FORCE_VERIFY").unwrap_or(false)
}

fn default_redirect_timeout_ms() -> Option<u64> {
    env_value("TWITCH_REDIRECT_TIMEOUT_MS")
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            client_secret: default_client_secret(),
            redirect_uri: default_redirect_uri(),
            authority_url: default_authority_url(),
            scopes: default_scopes(),
            force_verify: default_force_verify(),
            redirect_timeout_ms: default_redirect_timeout_ms(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("authority_url", &self.authority_url)
            .field("scopes", &self.scopes)
            .field("force_verify", &self.force_verify)
            .field("redirect_timeout_ms", &self.redirect_timeout_ms)
            .finish()
    }
}

impl AuthConfig {
    /// Create a configuration for the given client id, everything else from defaults
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Build a configuration purely from the environment
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_authority_url(mut self, authority_url: impl Into<String>) -> Self {
        self.authority_url = authority_url.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_force_verify(mut self, force_verify: bool) -> Self {
        self.force_verify = force_verify;
        self
    }

    /// Bound the browser wait. Sub-millisecond parts are rounded up so a non-zero
    /// timeout never becomes zero.
    pub fn with_redirect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.redirect_timeout_ms = timeout.map(|t| {
            let millis = t.as_nanos().div_ceil(1_000_000);
            u64::try_from(millis).unwrap_or(u64::MAX)
        });
        self
    }

    /// How long a browser flow waits for the redirect, `None` meaning forever
    pub fn redirect_timeout(&self) -> Option<Duration> {
        self.redirect_timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AuthConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());

        Ok(config)
    }

    /// Save configuration to a JSON file (the client secret is never written)
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str).await?;
        debug!("Saved configuration to {}", path.display());

        Ok(())
    }
}
