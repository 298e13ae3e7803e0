//! Invite ledger
//!
//! Issues single-use invites and redeems them into symmetric connections.
//! Redemption claims the invite first, as one atomic remove-and-return on the
//! invite store, and only then inserts the edge. A crash or storage failure
//! between the two steps leaves the invite consumed with no edge.

use crate::errors::*;
use crate::token::TokenGenerator;
use qrlink_storage::{IdentityKeyStore, InviteStore, MemoryStorage};
use qrlink_types::{Connection, Handle, Invite, InviteToken, RedeemOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts at finding an unused token before giving up.
const MAX_ISSUE_ATTEMPTS: usize = 3;

pub struct InviteLedger {
    invites: Arc<dyn InviteStore>,
    connections: Arc<dyn IdentityKeyStore>,
    tokens: TokenGenerator,
}

impl InviteLedger {
    pub fn new(invites: Arc<dyn InviteStore>, connections: Arc<dyn IdentityKeyStore>) -> Self {
        Self {
            invites,
            connections,
            tokens: TokenGenerator::new(),
        }
    }

    /// Ledger over a single backend holding both relations.
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: InviteStore + IdentityKeyStore + 'static,
    {
        Self::new(store.clone(), store)
    }

    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStorage::new()))
    }

    pub fn with_token_generator(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = tokens;
        self
    }

    /// Mint a pending invite on behalf of `issuer`.
    pub fn issue(&self, issuer: &Handle) -> Result<InviteToken> {
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let token = self.tokens.generate()?;
            let invite = Invite::new(token.clone(), issuer.clone());

            if self.invites.insert_invite(&invite)? {
                debug!(issuer = %issuer, "Issued invite");
                return Ok(token);
            }
            warn!(issuer = %issuer, attempt, "Invite token collision, regenerating");
        }

        Err(InviteError::Resource(format!(
            "no unused invite token after {MAX_ISSUE_ATTEMPTS} attempts"
        )))
    }

    /// Consume `token` on behalf of `redeemer`.
    ///
    /// Exactly one call per issued token can succeed; every other call,
    /// concurrent or later, fails with [`InviteError::InviteNotFound`].
    /// Redeeming one's own invite consumes it without creating an edge.
    pub fn redeem(&self, redeemer: &Handle, token: &InviteToken) -> Result<RedeemOutcome> {
        let invite = match self.invites.claim_invite(token) {
            Ok(Some(invite)) => invite,
            Ok(None) => {
                debug!(redeemer = %redeemer, "Invite not found or already used");
                return Err(InviteError::InviteNotFound {
                    token: token.to_string(),
                });
            }
            Err(err) => {
                warn!(redeemer = %redeemer, error = %err, "Invite claim failed");
                return Err(err.into());
            }
        };

        if invite.is_issued_by(redeemer) {
            info!(issuer = %invite.issuer, "Invite redeemed by its issuer, no connection made");
            return Ok(RedeemOutcome::SelfRedeemed {
                issuer: invite.issuer,
            });
        }

        let edge = Connection::new(invite.issuer.clone(), redeemer.clone());
        let newly_connected = self.connections.connect(&edge).map_err(|err| {
            warn!(
                %edge,
                error = %err,
                "Invite consumed but connection insert failed"
            );
            InviteError::from(err)
        })?;

        if newly_connected {
            info!(%edge, "Connected");
        } else {
            debug!(%edge, "Already connected");
        }

        Ok(RedeemOutcome::Connected {
            issuer: invite.issuer,
            newly_connected,
        })
    }

    pub fn list_connections(&self, handle: &Handle) -> Result<Vec<Handle>> {
        Ok(self.connections.list_connections(handle)?)
    }

    pub fn pending_invites(&self) -> Result<usize> {
        Ok(self.invites.pending_invites()?)
    }

    pub fn connections(&self) -> &Arc<dyn IdentityKeyStore> {
        &self.connections
    }
}

impl Default for InviteLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::{CryptoRng, RngCore};

    fn h(name: &str) -> Handle {
        Handle::from(name)
    }

    /// Every byte is zero, so every generated token is the same.
    struct ConstantRng;

    impl RngCore for ConstantRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand_core::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    impl CryptoRng for ConstantRng {}

    #[test]
    fn issue_then_redeem_connects_both_sides() {
        let ledger = InviteLedger::in_memory();
        let token = ledger.issue(&h("alice")).unwrap();
        assert_eq!(ledger.pending_invites().unwrap(), 1);

        let outcome = ledger.redeem(&h("bob"), &token).unwrap();
        assert_eq!(
            outcome,
            RedeemOutcome::Connected {
                issuer: h("alice"),
                newly_connected: true,
            }
        );
        assert_eq!(ledger.pending_invites().unwrap(), 0);
        assert_eq!(ledger.list_connections(&h("alice")).unwrap(), vec![h("bob")]);
        assert_eq!(ledger.list_connections(&h("bob")).unwrap(), vec![h("alice")]);
    }

    #[test]
    fn exhausted_token_collisions_keep_the_first_invite() {
        let ledger = InviteLedger::in_memory()
            .with_token_generator(TokenGenerator::new().with_rng(ConstantRng));

        let first = ledger.issue(&h("alice")).unwrap();
        assert_eq!(first.as_str(), "u".repeat(21));

        let err = ledger.issue(&h("bob")).unwrap_err();
        assert!(matches!(err, InviteError::Resource(_)));
        assert!(err.is_retryable());
        assert_eq!(ledger.pending_invites().unwrap(), 1);

        let outcome = ledger.redeem(&h("carol"), &first).unwrap();
        assert_eq!(outcome.issuer(), &h("alice"));
        assert_eq!(ledger.list_connections(&h("carol")).unwrap(), vec![h("alice")]);
    }

    #[test]
    fn second_redeem_is_not_found() {
        let ledger = InviteLedger::in_memory();
        let token = ledger.issue(&h("alice")).unwrap();
        ledger.redeem(&h("bob"), &token).unwrap();

        let err = ledger.redeem(&h("carol"), &token).unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert!(ledger.list_connections(&h("carol")).unwrap().is_empty());
    }

    #[test]
    fn self_redeem_consumes_without_edge() {
        let ledger = InviteLedger::in_memory();
        let token = ledger.issue(&h("alice")).unwrap();

        let outcome = ledger.redeem(&h("alice"), &token).unwrap();
        assert_eq!(outcome, RedeemOutcome::SelfRedeemed { issuer: h("alice") });
        assert!(ledger.list_connections(&h("alice")).unwrap().is_empty());

        assert!(ledger.redeem(&h("bob"), &token).unwrap_err().is_not_found());
        assert!(ledger.list_connections(&h("bob")).unwrap().is_empty());
    }

    #[test]
    fn reconnecting_through_second_invite_is_a_no_op() {
        let ledger = InviteLedger::in_memory();
        let first = ledger.issue(&h("alice")).unwrap();
        let second = ledger.issue(&h("bob")).unwrap();

        ledger.redeem(&h("bob"), &first).unwrap();
        let outcome = ledger.redeem(&h("alice"), &second).unwrap();

        assert_eq!(
            outcome,
            RedeemOutcome::Connected {
                issuer: h("bob"),
                newly_connected: false,
            }
        );
        assert_eq!(ledger.list_connections(&h("alice")).unwrap(), vec![h("bob")]);
        assert_eq!(ledger.connections().connection_count().unwrap(), 1);
    }

    #[test]
    fn unknown_token_is_not_found() {
        let ledger = InviteLedger::in_memory();
        let err = ledger
            .redeem(&h("mallory"), &InviteToken::from("nonexistent"))
            .unwrap_err();
        assert!(matches!(err, InviteError::InviteNotFound { ref token } if token == "nonexistent"));
    }
}
