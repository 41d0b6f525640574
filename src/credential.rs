//! # Credential
//! The single admin password that gates every change to the bell.
//!
//! The password travels in cleartext in the query string and is compared as plain text. This is a known weakness
//! of the device: anyone on the same network can read it off the wire. There is no hashing and no rate limiting.
use crate::config::{FACTORY_PASSWORD, PASSWORD_MAX_LEN};
use crate::error::ValidationError;
use core::fmt;
use heapless::String;

/// The admin password
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// The secret, never empty and never longer than [`PASSWORD_MAX_LEN`]
    secret: String<PASSWORD_MAX_LEN>,
}

impl Credential {
    /// The password a fresh device starts with
    pub fn factory() -> Self {
        let mut secret = String::new();
        // the factory password is shorter than PASSWORD_MAX_LEN
        let _ = secret.push_str(FACTORY_PASSWORD);
        Self { secret }
    }

    /// Check a new password against the limits of the password region
    pub fn new(secret: &str) -> Result<Self, ValidationError> {
        if secret.is_empty() {
            return Err(ValidationError::PasswordEmpty);
        }
        if secret.len() > PASSWORD_MAX_LEN {
            return Err(ValidationError::PasswordTooLong(secret.len()));
        }
        if secret.bytes().any(|b| b == 0) {
            return Err(ValidationError::PasswordContainsNul);
        }
        let mut stored = String::new();
        stored
            .push_str(secret)
            .map_err(|_| ValidationError::PasswordTooLong(secret.len()))?;
        Ok(Self { secret: stored })
    }

    /// Whether the supplied password is exactly this one
    pub fn matches(&self, supplied: &str) -> bool {
        self.secret.as_str() == supplied
    }

    /// Whether this is still the factory password
    pub fn is_factory_default(&self) -> bool {
        self.secret.as_str() == FACTORY_PASSWORD
    }

    /// The raw bytes, as written to the store
    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self::factory()
    }
}

// keep the secret out of logs and panic messages
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("factory_default", &self.is_factory_default())
            .finish_non_exhaustive()
    }
}
