//! Invite records and redemption outcomes.

use crate::Handle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Single-use invite token.
///
/// Tokens minted by the ledger are random URL-safe strings. Tokens received
/// from callers are wrapped as-is; an unknown value simply never matches a
/// pending invite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteToken(pub String);

impl InviteToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InviteToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InviteToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pending invite as held by the invite store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub token: InviteToken,
    pub issuer: Handle,
    /// Seconds since UNIX_EPOCH. Informational only; invites never expire.
    pub created_at: u64,
}

impl Invite {
    pub fn new(token: InviteToken, issuer: Handle) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            token,
            issuer,
            created_at,
        }
    }

    pub fn is_issued_by(&self, handle: &Handle) -> bool {
        &self.issuer == handle
    }
}

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedeemOutcome {
    /// The redeemer and issuer are now connected.
    Connected {
        issuer: Handle,
        /// `false` when the pair was already connected through another invite.
        newly_connected: bool,
    },
    /// The issuer followed their own invite. The invite is consumed, no edge is created.
    SelfRedeemed { issuer: Handle },
}

impl RedeemOutcome {
    /// Issuer of the consumed invite, for display or redirects.
    pub fn issuer(&self) -> &Handle {
        match self {
            RedeemOutcome::Connected { issuer, .. } => issuer,
            RedeemOutcome::SelfRedeemed { issuer } => issuer,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, RedeemOutcome::Connected { .. })
    }
}
