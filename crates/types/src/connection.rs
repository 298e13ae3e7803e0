//! Symmetric connection edges.

use crate::Handle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unordered pair of handles.
///
/// `Connection::new(a, b) == Connection::new(b, a)`; the endpoints are kept
/// sorted so the pair can be used directly as a dedup key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Connection {
    a: Handle,
    b: Handle,
}

impl Connection {
    pub fn new(first: Handle, second: Handle) -> Self {
        if first <= second {
            Self {
                a: first,
                b: second,
            }
        } else {
            Self {
                a: second,
                b: first,
            }
        }
    }

    /// Endpoints in normalized order.
    pub fn endpoints(&self) -> (&Handle, &Handle) {
        (&self.a, &self.b)
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        &self.a == handle || &self.b == handle
    }

    /// The other endpoint, if `handle` is part of this edge.
    pub fn peer_of(&self, handle: &Handle) -> Option<&Handle> {
        if &self.a == handle {
            Some(&self.b)
        } else if &self.b == handle {
            Some(&self.a)
        } else {
            None
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.a == self.b
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_order_independent() {
        let ab = Connection::new(Handle::from("alice"), Handle::from("bob"));
        let ba = Connection::new(Handle::from("bob"), Handle::from("alice"));
        assert_eq!(ab, ba);
        assert_eq!(ab.endpoints().0.as_str(), "alice");
    }

    #[test]
    fn peer_lookup() {
        let edge = Connection::new(Handle::from("bob"), Handle::from("alice"));
        assert_eq!(edge.peer_of(&Handle::from("alice")), Some(&Handle::from("bob")));
        assert_eq!(edge.peer_of(&Handle::from("bob")), Some(&Handle::from("alice")));
        assert_eq!(edge.peer_of(&Handle::from("carol")), None);
        assert!(!edge.is_self_loop());
        assert!(Connection::new(Handle::from("x"), Handle::from("x")).is_self_loop());
    }

    #[test]
    fn displays_normalized_endpoints() {
        let edge = Connection::new(Handle::from("bob"), Handle::from("alice"));
        assert_eq!(edge.to_string(), "alice <-> bob");
    }
}
