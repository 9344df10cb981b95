//! Bearer credential handling and keychain storage.
//!
//! The synchronization layer never decodes the token; it only attaches it
//! to the WebSocket upgrade, the STOMP CONNECT frame and REST requests.
//! [`load_token`] and [`save_token`] let the binary keep a token in the
//! system keychain between runs.

use std::fmt;

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keychain service name used for the stored token.
const SERVICE: &str = "tradewire";

/// Keychain entry holding the bearer token.
const TOKEN_ENTRY: &str = "bearer_token";

/// An opaque bearer token supplied by the external auth collaborator.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    /// Wraps a raw token. A leading `Bearer ` prefix is tolerated.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let token = match token.strip_prefix("Bearer ") {
            Some(stripped) => stripped.trim().to_string(),
            None => token.trim().to_string(),
        };
        Self(Zeroizing::new(token))
    }

    /// Returns the value for an `Authorization` header.
    pub fn bearer(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("Bearer {}", self.0.as_str()))
    }

    /// Returns `true` if no token is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Loads the stored token from the keychain, returning `None` if not set.
pub fn load_token() -> Option<Credential> {
    let entry = keyring::Entry::new(SERVICE, TOKEN_ENTRY).ok()?;
    match entry.get_password() {
        Ok(token) => {
            debug!("loaded bearer token from keychain");
            Some(Credential::new(Zeroizing::new(token).as_str()))
        }
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(entry = TOKEN_ENTRY, error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Saves a token to the keychain.
pub fn save_token(credential: &Credential) -> crate::Result<()> {
    let entry = keyring::Entry::new(SERVICE, TOKEN_ENTRY)
        .map_err(|e| crate::TradewireError::Config(format!("keyring entry error: {e}")))?;
    entry
        .set_password(credential.0.as_str())
        .map_err(|e| crate::TradewireError::Config(format!("failed to save to keychain: {e}")))
}

/// Removes the stored token, e.g. after the server rejected it.
pub fn forget_token() {
    let Ok(entry) = keyring::Entry::new(SERVICE, TOKEN_ENTRY) else {
        return;
    };
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => {}
        Err(e) => warn!(entry = TOKEN_ENTRY, error = %e, "failed to delete keychain entry"),
    }
}
