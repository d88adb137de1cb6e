//! Encrypted credential files.
//!
//! File layout is `[12-byte nonce][AES-256-GCM ciphertext]`. The nonce is fresh for every
//! write. Keys are supplied by the caller and never derived or stored here.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use crate::auth::credentials::Credentials;
use crate::error::{AuthError, AuthResult};

/// Length of the nonce prefix written before the ciphertext
pub const IV_LEN: usize = 12;

/// Required key length (AES-256)
pub const KEY_LEN: usize = 32;

/// Blocking encrypt/decrypt of credential payloads to and from files.
///
/// Failures never propagate: `encrypt` becomes a no-op and `decrypt` yields an empty
/// string, with a warning logged in both cases. Concurrent writes to one path race and the
/// last rename wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialCodec;

impl CredentialCodec {
    /// Encrypt `plaintext` under `key` and replace the file at `path`
    pub fn encrypt(path: impl AsRef<Path>, plaintext: &str, key: &[u8]) {
        write_sealed(path.as_ref(), plaintext, key);
    }

    /// Decrypt the file at `path`, returning `""` when nothing usable is there
    pub fn decrypt(path: impl AsRef<Path>, key: &[u8]) -> String {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No credential file present");
            return String::new();
        }

        let result = fs::read(path)
            .map_err(|e| AuthError::crypto(format!("Failed to read credential file: {e}")))
            .and_then(|bytes| open(&bytes, key));
        match result {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to decrypt credentials");
                String::new()
            }
        }
    }

    /// Serialize credentials to JSON and encrypt them to `path`.
    ///
    /// Returns whether the file was replaced. Failures are logged like [`Self::encrypt`].
    pub fn save_credentials(path: impl AsRef<Path>, credentials: &Credentials, key: &[u8]) -> bool {
        match serde_json::to_string(credentials) {
            Ok(json) => write_sealed(path.as_ref(), &json, key),
            Err(e) => {
                warn!(error = %e, "Failed to serialize credentials");
                false
            }
        }
    }

    /// Decrypt and parse credentials previously written by [`Self::save_credentials`]
    pub fn load_credentials(path: impl AsRef<Path>, key: &[u8]) -> Option<Credentials> {
        let path = path.as_ref();
        let json = Self::decrypt(path, key);
        if json.is_empty() {
            return None;
        }
        match serde_json::from_str(&json) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Stored credentials are not valid JSON");
                None
            }
        }
    }

    /// Decode a base64 key and check its length
    pub fn key_from_base64(encoded: &str) -> AuthResult<Vec<u8>> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::crypto(format!("Key is not valid base64: {e}")))?;
        if key.len() != KEY_LEN {
            return Err(AuthError::crypto(format!(
                "Key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Ok(key)
    }

    /// Generate a random key, base64 encoded
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        STANDARD.encode(key)
    }
}

fn write_sealed(path: &Path, plaintext: &str, key: &[u8]) -> bool {
    match seal(plaintext, key).and_then(|sealed| write_atomically(path, &sealed)) {
        Ok(()) => {
            debug!(path = %path.display(), "Encrypted credentials written");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to write encrypted credentials");
            false
        }
    }
}

fn cipher_for(key: &[u8]) -> AuthResult<Aes256Gcm> {
    if key.is_empty() {
        return Err(AuthError::crypto("Encryption key is empty"));
    }
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| AuthError::crypto(format!("Key must be {KEY_LEN} bytes, got {}", key.len())))
}

fn seal(plaintext: &str, key: &[u8]) -> AuthResult<Vec<u8>> {
    let cipher = cipher_for(key)?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|e| AuthError::crypto(format!("Encryption failed: {e}")))?;

    let mut sealed = Vec::with_capacity(IV_LEN + ciphertext.len());
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open(bytes: &[u8], key: &[u8]) -> AuthResult<String> {
    let cipher = cipher_for(key)?;
    if bytes.len() < IV_LEN {
        return Err(AuthError::crypto("Credential file is shorter than its IV"));
    }

    let (iv, ciphertext) = bytes.split_at(IV_LEN);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| AuthError::crypto("Decryption failed (wrong key or corrupted file)"))?;

    String::from_utf8(plaintext)
        .map_err(|e| AuthError::crypto(format!("Decrypted payload is not UTF-8: {e}")))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> AuthResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AuthError::crypto(format!("Failed to create {}: {e}", parent.display())))?;
    }

    let temp = temp_path_for(path);
    let written = fs::write(&temp, bytes).and_then(|()| {
        restrict_permissions(&temp)?;
        fs::rename(&temp, path)
    });

    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(AuthError::crypto(format!("Failed to write credential file: {e}")));
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
