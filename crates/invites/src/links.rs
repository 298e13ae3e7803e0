//! Invite link rendering.
//!
//! The redemption link is what gets encoded into the QR image; the QR link is
//! where the image itself is served. No I/O happens here.

use qrlink_types::InviteToken;

pub const DEFAULT_SERVER_ORIGIN: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteLinks {
    origin: String,
}

impl InviteLinks {
    /// Trailing slashes are dropped; a blank origin falls back to the default.
    pub fn new(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        let trimmed = origin.trim().trim_end_matches('/');
        let origin = if trimmed.is_empty() {
            DEFAULT_SERVER_ORIGIN.to_string()
        } else {
            trimmed.to_string()
        };
        Self { origin }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn redeem_url(&self, token: &InviteToken) -> String {
        format!("{}/invites/{}", self.origin, token)
    }

    pub fn qr_url(&self, token: &InviteToken) -> String {
        format!("{}/qr/{}", self.origin, token)
    }

    pub fn connections_url(&self) -> String {
        format!("{}/connections", self.origin)
    }
}

impl Default for InviteLinks {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_ORIGIN)
    }
}
