pub mod auth;
pub mod common;
pub mod config;
pub mod error;
pub mod http_client;
pub mod logging;

// Re-export core components
pub use crate::auth::{
    CredentialCodec, Credentials, OAuthFlows, TokenAuthority, TokenType,
};
pub use crate::common::ExpiringCache;
pub use crate::config::AuthConfig;
pub use crate::error::{AuthError, AuthErrorKind, AuthResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
