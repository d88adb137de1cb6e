//! One-shot loopback listener that captures the browser redirect at the end of a consent
//! screen.
//!
//! Implicit-grant parameters arrive in the URL fragment, which browsers never send to a
//! server. The first hit on the bare redirect URI is answered with a small page that
//! re-requests the same path with the fragment moved into the query string; that second
//! request carries the payload.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::Html;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, trace, warn};
use url::{Host, Url};

use crate::error::{AuthError, AuthResult};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const BOOTSTRAP_HTML: &str = r#"<!DOCTYPE html>
<html><head><title>Completing sign-in</title></head>
<body>
<p>Completing sign-in...</p>
<script>
window.location.replace(window.location.pathname + '?' + window.location.hash.substring(1));
</script>
</body></html>"#;

const CLOSE_HTML: &str = r#"<!DOCTYPE html>
<html><head><title>Sign-in complete</title></head>
<body onload="window.close()">
<p>Authentication complete. You may close this window.</p>
</body></html>"#;

/// Append a trailing `/` to a redirect URI that lacks one
pub fn normalize_redirect_uri(redirect_uri: &str) -> String {
    let trimmed = redirect_uri.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// A loopback socket bound for one redirect capture
#[derive(Debug)]
pub struct BoundRedirectListener {
    listener: TcpListener,
    /// Redirect URI as it must be sent to the authority (real port filled in)
    redirect_uri: String,
    /// Path component the browser will request
    path: String,
}

/// Bind the loopback address named by `redirect_uri`.
///
/// Only `http` URIs on `localhost`, `127.0.0.0/8` or `::1` are accepted. Port `0` binds an
/// ephemeral port and the effective redirect URI is rewritten to carry it.
///
/// `localhost` binds `127.0.0.1` only. Browsers that try `::1` first fall back to IPv4 when
/// the IPv6 connection is refused; use `http://[::1]:<port>/` to listen on IPv6 instead.
pub async fn bind_redirect_listener(redirect_uri: &str) -> AuthResult<BoundRedirectListener> {
    let normalized = normalize_redirect_uri(redirect_uri);
    let mut url = Url::parse(&normalized)
        .map_err(|e| AuthError::listener(format!("Invalid redirect URI {normalized}: {e}")))?;

    if url.scheme() != "http" {
        return Err(AuthError::listener(format!(
            "Redirect URI must use http: {normalized}"
        )));
    }

    let ip: IpAddr = match url.host() {
        Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        Some(Host::Ipv4(ip)) if ip.is_loopback() => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) if ip.is_loopback() => IpAddr::V6(ip),
        _ => {
            return Err(AuthError::listener(format!(
                "Redirect URI must point at a loopback host: {normalized}"
            )))
        }
    };
    let port = url.port_or_known_default().unwrap_or(80);

    let listener = TcpListener::bind((ip, port)).await.map_err(|e| {
        AuthError::listener(format!("Failed to bind redirect listener on {ip}:{port}: {e}"))
    })?;

    let redirect_uri = if port == 0 {
        let actual = listener
            .local_addr()
            .map_err(|e| AuthError::listener(format!("Failed to read bound address: {e}")))?
            .port();
        url.set_port(Some(actual))
            .map_err(|_| AuthError::listener(format!("Cannot set port on {normalized}")))?;
        url.to_string()
    } else {
        normalized
    };

    info!(redirect_uri = %redirect_uri, "Redirect listener bound");

    Ok(BoundRedirectListener {
        listener,
        redirect_uri,
        path: url.path().to_string(),
    })
}

#[derive(Clone)]
struct ListenerState {
    path: Arc<str>,
    redirect_uri: Arc<str>,
    payload_tx: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

impl BoundRedirectListener {
    /// Redirect URI to send to the authority
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn local_addr(&self) -> AuthResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| AuthError::listener(format!("Failed to read bound address: {e}")))
    }

    /// Serve until one payload-bearing redirect arrives and return its full URL.
    ///
    /// With `timeout = None` this waits for as long as the user takes.
    pub async fn wait_for_redirect(self, timeout: Option<Duration>) -> AuthResult<String> {
        let (payload_tx, payload_rx) = oneshot::channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = ListenerState {
            path: Arc::from(self.path.as_str()),
            redirect_uri: Arc::from(self.redirect_uri.as_str()),
            payload_tx: Arc::new(Mutex::new(Some(payload_tx))),
        };
        let app = Router::new().fallback(handle_request).with_state(state);

        let listener = self.listener;
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        debug!(redirect_uri = %self.redirect_uri, ?timeout, "Waiting for browser redirect");

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, payload_rx).await {
                Ok(result) => result.map_err(|_| stopped_early()),
                Err(_) => Err(AuthError::listener(format!(
                    "Timed out after {limit:?} waiting for the browser redirect"
                ))),
            },
            None => payload_rx.await.map_err(|_| stopped_early()),
        };

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Ok(()))) => trace!("Redirect listener stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "Redirect listener exited with an error"),
            Ok(Err(e)) => warn!(error = %e, "Redirect listener task failed"),
            Err(_) => {
                warn!("Redirect listener did not stop in time, aborting");
                server.abort();
            }
        }

        received
    }
}

fn stopped_early() -> AuthError {
    AuthError::listener("Redirect listener stopped before a redirect arrived")
}

async fn handle_request(
    State(state): State<ListenerState>,
    method: Method,
    uri: Uri,
) -> (StatusCode, Html<&'static str>) {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, Html(""));
    }
    if uri.path() != &*state.path {
        trace!(path = uri.path(), "Ignoring request outside the redirect path");
        return (StatusCode::NOT_FOUND, Html(""));
    }

    let Some(query) = uri.query() else {
        debug!("Serving fragment bootstrap page");
        return (StatusCode::OK, Html(BOOTSTRAP_HTML));
    };

    let captured = format!("{}?{}", state.redirect_uri, query);
    match state.payload_tx.lock().await.take() {
        Some(tx) => {
            info!("Captured browser redirect");
            let _ = tx.send(captured);
        }
        None => debug!("Redirect already captured, ignoring repeat delivery"),
    }

    (StatusCode::OK, Html(CLOSE_HTML))
}
