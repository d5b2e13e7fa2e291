//! Credential lookup and scrubbing
//!
//! API keys are read from the environment first and from the OS keychain
//! second (service `coe`). They are carried as [`SecretString`] so they never
//! end up in logs, and any provider text that might echo one back goes
//! through [`scrub_secrets`] before it is logged or stored.

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::fmt;
use std::sync::OnceLock;

/// Keychain service name
pub const SERVICE_NAME: &str = "coe";

/// A wrapper for sensitive string data that prevents accidental logging.
///
/// `Debug` and `Display` always print `[REDACTED]`; use `unsecure()` to reach
/// the value when building a request.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn unsecure(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Resolves secrets from the environment, then the OS keychain.
pub struct SecretManager {
    service_name: String,
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl SecretManager {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Look up `key`, preferring the environment variable `env_var`.
    ///
    /// Never prompts: sessions run unattended in batches.
    ///
    /// # Errors
    /// Returns `EngineError::Config` when neither source has the secret.
    pub fn get_secret(&self, key: &str, env_var: &str) -> Result<SecretString, EngineError> {
        if let Ok(value) = std::env::var(env_var) {
            if !value.trim().is_empty() {
                tracing::debug!("Using secret '{}' from ${}", key, env_var);
                return Ok(SecretString::new(value.trim()));
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::Config(format!("Failed to open keychain entry '{}': {}", key, e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(SecretString::new(secret))
            }
            Err(keyring::Error::NoEntry) => Err(EngineError::Config(format!(
                "Secret '{}' not found. Set ${} or store it in the keychain under service '{}'",
                key, env_var, self.service_name
            ))),
            Err(e) => Err(EngineError::Config(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Whether the secret is available from either source
    pub fn has_secret(&self, key: &str, env_var: &str) -> bool {
        self.get_secret(key, env_var).is_ok()
    }
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static [Regex] {
    SECRET_PATTERNS.get_or_init(|| {
        [
            // OpenAI style keys, including sk-proj- variants
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"Bearer\s+[^\s]{20,}",
            r#"(?i)"?api[_-]?key"?\s*[:=]\s*"?[a-zA-Z0-9\-_]{16,}"?"#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace anything that looks like a credential with `[REDACTED]`.
///
/// # Examples
/// ```
/// use coe_engine::secrets::scrub_secrets;
///
/// let scrubbed = scrub_secrets("401: invalid key sk-1234567890abcdefghij");
/// assert_eq!(scrubbed, "401: invalid key [REDACTED]");
/// ```
pub fn scrub_secrets(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").into_owned();
    }
    result
}
