pub mod authority;
pub mod browser;
pub mod codec;
pub mod credentials;
pub mod flow;
pub mod listener;
pub mod nonce;

pub use authority::TokenAuthority;
pub use browser::{BrowserLauncher, SystemBrowser};
pub use codec::CredentialCodec;
pub use credentials::{Credentials, TokenType};
pub use flow::OAuthFlows;
pub use listener::{bind_redirect_listener, normalize_redirect_uri, BoundRedirectListener};
pub use nonce::generate_nonce;
