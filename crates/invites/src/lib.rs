//! Invite ledger for QRLink connections
//!
//! A handle mints a single-use invite token (rendered elsewhere as a QR
//! code), another handle redeems it, and the ledger records a symmetric
//! connection between the two. Redemption is exactly-once per token, even
//! under concurrent redeemers.

pub mod errors;
pub mod ledger;
pub mod links;
pub mod token;

pub use errors::*;
pub use ledger::InviteLedger;
pub use links::{InviteLinks, DEFAULT_SERVER_ORIGIN};
pub use token::{TokenGenerator, DEFAULT_TOKEN_LENGTH, MIN_TOKEN_LENGTH, TOKEN_ALPHABET};
