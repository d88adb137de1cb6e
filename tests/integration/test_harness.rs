//! Integration test harness
//! Provides a mock Twitch authority and a scripted browser

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mockito::{Mock, ServerGuard};
use serde_json::{json, Value};
use url::Url;

use twitch_credentials::auth::BrowserLauncher;
use twitch_credentials::http_client::ReqwestHttpClient;
use twitch_credentials::{AuthConfig, OAuthFlows, TokenAuthority};

pub const CLIENT_ID: &str = "cid";
pub const CLIENT_SECRET: &str = "secret";

/// Mock authority serving `/oauth2/*`
pub struct TestAuthority {
    pub server: ServerGuard,
}

impl TestAuthority {
    pub async fn start() -> Self {
        Self {
            server: mockito::Server::new_async().await,
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}/oauth2", self.server.url())
    }

    /// Authority client using a real reqwest transport that never goes through a proxy
    pub fn client(&self) -> TokenAuthority {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        TokenAuthority::with_http_client(
            self.base_url(),
            Arc::new(ReqwestHttpClient::with_client(http)),
        )
    }

    pub fn flows(&self, browser: Arc<dyn BrowserLauncher>) -> OAuthFlows {
        OAuthFlows::with_browser(self.client(), browser)
    }

    pub fn config(&self) -> AuthConfig {
        AuthConfig::new(CLIENT_ID)
            .with_client_secret(CLIENT_SECRET)
            .with_redirect_uri("http://127.0.0.1:0/")
            .with_authority_url(self.base_url())
            .with_scopes(["chat:read"])
            .with_redirect_timeout(Some(Duration::from_secs(10)))
    }

    /// Mock `/validate` for the given token
    pub async fn mock_validate(&mut self, token: &str, body: Value) -> Mock {
        self.server
            .mock("GET", "/oauth2/validate")
            .match_header("authorization", format!("OAuth {token}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    /// Mock `/token` for requests carrying every given form pair
    pub async fn mock_token(&mut self, form: &[(&str, &str)], status: usize, body: Value) -> Mock {
        let matchers = form
            .iter()
            .map(|(key, value)| mockito::Matcher::UrlEncoded(key.to_string(), value.to_string()))
            .collect();
        self.server
            .mock("POST", "/oauth2/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(mockito::Matcher::AllOf(matchers))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }
}

/// Validation body for a user token
pub fn user_validation() -> Value {
    json!({
        "client_id": CLIENT_ID,
        "login": "user1",
        "user_id": "1234",
        "scopes": ["chat:read"],
        "expires_in": 3600,
        "status": 200
    })
}

/// Browser stand-in that performs the two-step redirect against the local listener.
///
/// `reply` receives the state from the authorize URL and returns the fragment the
/// authority would have appended to the redirect URI.
pub fn scripted_browser<F>(reply: F) -> Arc<dyn BrowserLauncher>
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    Arc::new(move |authorize_url: &str| -> anyhow::Result<()> {
        let url = Url::parse(authorize_url)?;
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let redirect_uri = params
            .get("redirect_uri")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("authorize URL has no redirect_uri"))?;
        let fragment = reply(params.get("state").map(String::as_str).unwrap_or(""));

        tokio::spawn(async move {
            let http = reqwest::Client::builder().no_proxy().build().unwrap();
            // What a browser does with `redirect_uri#fragment`: the bare hit, then the
            // bootstrap page's re-request with the fragment as query
            let page = http.get(&redirect_uri).send().await.unwrap();
            let body = page.text().await.unwrap();
            assert!(body.contains("location.hash"));
            let _ = http.get(format!("{redirect_uri}?{fragment}")).send().await;
        });
        Ok(())
    })
}

/// Browser that never completes consent
pub fn abandoned_browser() -> Arc<dyn BrowserLauncher> {
    Arc::new(|_: &str| -> anyhow::Result<()> { Ok(()) })
}
