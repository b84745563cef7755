//! Secret handling.
//!
//! Credential values (client secrets, instance passwords) move through the
//! services as `Secret` so they cannot leak into logs or debug output.

use secrecy::{ExposeSecret, SecretBox};

/// Credential wrapper that prevents accidental logging.
///
/// The inner value is wrapped with `secrecy::SecretBox` so it is not
/// printed by `Debug` or `Display`; callers must go through [`expose`].
///
/// [`expose`]: Secret::expose
#[derive(Clone)]
pub struct Secret(SecretBox<str>);

impl Secret {
    /// Wrap a credential value.
    #[must_use]
    pub fn new(value: String) -> Self {
        Self(SecretBox::new(value.into_boxed_str()))
    }

    /// Expose the secret for an actual outbound call.
    ///
    /// Use sparingly - only when attaching credentials to a request.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the wrapped value is empty (i.e. not configured).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl Default for Secret {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}
