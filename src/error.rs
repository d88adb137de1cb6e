use std::fmt;
use thiserror::Error;

/// Error returned by every fallible credential operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct AuthError {
    /// Stable, machine-readable classification
    kind: AuthErrorKind,
    /// Human-readable diagnostic text (not stable across versions)
    message: String,
}

/// Type alias for results produced by this crate
pub type AuthResult<T> = Result<T, AuthError>;

/// Classification of credential failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// Redirect parameters were missing, malformed or carried a mismatched state
    ParameterValidation,
    /// No response, or a non-success HTTP status, from the authority
    Transport,
    /// The authority reported failure in-band despite a successful HTTP status
    AuthorityRejection,
    /// A response body could not be decoded
    Deserialization,
    /// The supplied credentials cannot be used for the requested operation
    CredentialState,
    /// Encryption or decryption of persisted credentials failed
    Crypto,
    /// The local redirect listener could not be bound or did not complete
    Listener,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            AuthErrorKind::ParameterValidation => "PARAMETER_VALIDATION",
            AuthErrorKind::Transport => "TRANSPORT",
            AuthErrorKind::AuthorityRejection => "AUTHORITY_REJECTION",
            AuthErrorKind::Deserialization => "DESERIALIZATION",
            AuthErrorKind::CredentialState => "CREDENTIAL_STATE",
            AuthErrorKind::Crypto => "CRYPTO",
            AuthErrorKind::Listener => "LISTENER",
        };
        write!(f, "{}", code_str)
    }
}

impl AuthError {
    /// Create an error of the given kind
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parameter_validation(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::ParameterValidation, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Transport, message)
    }

    pub fn authority_rejection(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::AuthorityRejection, message)
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Deserialization, message)
    }

    pub fn credential_state(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::CredentialState, message)
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Crypto, message)
    }

    pub fn listener(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Listener, message)
    }

    /// The error classification
    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    /// The diagnostic message without the kind prefix
    pub fn message(&self) -> &str {
        &self.message
    }
}
