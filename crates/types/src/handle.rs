use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque user identifier supplied by the authentication layer.
///
/// Handles are compared by equality only; no format is enforced here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub String);

impl Handle {
    /// Create a new handle from string
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get the handle as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes used for storage keys.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Handle {
    fn from(value: String) -> Self {
        Self(value)
    }
}
