//! Core data types shared by the QRLink crates.
//!
//! A `Handle` names a user, an `Invite` is a single-use token minted by one
//! handle, and a `Connection` is the symmetric edge created when another
//! handle redeems it.

pub mod connection;
pub mod handle;
pub mod invite;

pub use connection::*;
pub use handle::*;
pub use invite::*;
