use parking_lot::RwLock;
use qrlink_types::{Connection, Handle, Invite, InviteToken};
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Db, Tree};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Transaction aborted: {0}")]
    Transaction(String),
    #[error("Corrupt connection key ({len} bytes)")]
    CorruptKey { len: usize },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Pending-invite relation: `Invites(token unique, issuer)`.
///
/// Implementations manage their own locking. `claim_invite` must observe and
/// remove the invite in one indivisible step: for any token, at most one
/// caller ever gets `Some`.
pub trait InviteStore: Send + Sync {
    /// Insert a pending invite. Returns `false` without overwriting when the
    /// token is already taken.
    fn insert_invite(&self, invite: &Invite) -> Result<bool>;

    /// Atomically remove and return the pending invite for `token`.
    fn claim_invite(&self, token: &InviteToken) -> Result<Option<Invite>>;

    /// Number of invites still pending.
    fn pending_invites(&self) -> Result<usize>;
}

/// Connection graph: `Connections(unordered pair, unique)`.
pub trait IdentityKeyStore: Send + Sync {
    /// Insert `edge` if absent, visible from both endpoints. Returns `true`
    /// when the edge did not exist before; a duplicate is a no-op, never an
    /// error.
    fn connect(&self, edge: &Connection) -> Result<bool>;

    /// Every handle directly connected to `handle`, in ascending order.
    fn list_connections(&self, handle: &Handle) -> Result<Vec<Handle>>;

    fn are_connected(&self, a: &Handle, b: &Handle) -> Result<bool>;

    /// Number of unordered edges.
    fn connection_count(&self) -> Result<usize>;
}

impl<T: InviteStore + ?Sized> InviteStore for Arc<T> {
    fn insert_invite(&self, invite: &Invite) -> Result<bool> {
        (**self).insert_invite(invite)
    }

    fn claim_invite(&self, token: &InviteToken) -> Result<Option<Invite>> {
        (**self).claim_invite(token)
    }

    fn pending_invites(&self) -> Result<usize> {
        (**self).pending_invites()
    }
}

impl<T: IdentityKeyStore + ?Sized> IdentityKeyStore for Arc<T> {
    fn connect(&self, edge: &Connection) -> Result<bool> {
        (**self).connect(edge)
    }

    fn list_connections(&self, handle: &Handle) -> Result<Vec<Handle>> {
        (**self).list_connections(handle)
    }

    fn are_connected(&self, a: &Handle, b: &Handle) -> Result<bool> {
        (**self).are_connected(a, b)
    }

    fn connection_count(&self) -> Result<usize> {
        (**self).connection_count()
    }
}

const EMPTY: &[u8] = &[];

/// Directed row key: `u32 BE len(source) || source || target`.
///
/// The length prefix keeps `("ab", "c")` and `("a", "bc")` apart and makes
/// `source_prefix` an exact match on the source handle.
fn edge_key(source: &Handle, target: &Handle) -> Vec<u8> {
    let mut key = source_prefix(source);
    key.extend_from_slice(target.as_bytes());
    key
}

fn source_prefix(source: &Handle) -> Vec<u8> {
    let bytes = source.as_bytes();
    let mut key = Vec::with_capacity(4 + bytes.len());
    key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

fn split_edge_key(key: &[u8]) -> Result<(&[u8], &[u8])> {
    let corrupt = || StorageError::CorruptKey { len: key.len() };
    let len_bytes: [u8; 4] = key
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(corrupt)?;
    let source_len = u32::from_be_bytes(len_bytes) as usize;
    let rest = &key[4..];
    if rest.len() < source_len {
        return Err(corrupt());
    }
    Ok(rest.split_at(source_len))
}

fn handle_from_bytes(bytes: &[u8]) -> Handle {
    Handle::new(String::from_utf8_lossy(bytes).into_owned())
}

/// Sled-backed implementation.
///
/// Opened as a temporary database: contents live for the lifetime of the
/// process and are removed on drop.
pub struct SledStorage {
    // Owns the temporary database the trees live in.
    _db: Db,
    invites: Tree,
    connections: Tree,
}

impl SledStorage {
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        tracing::debug!("Opened temporary sled store");
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let invites = db.open_tree("invites")?;
        let connections = db.open_tree("connections")?;
        Ok(Self {
            _db: db,
            invites,
            connections,
        })
    }
}

impl InviteStore for SledStorage {
    fn insert_invite(&self, invite: &Invite) -> Result<bool> {
        let data = serde_json::to_vec(invite)?;
        let swapped =
            self.invites
                .compare_and_swap(invite.token.as_bytes(), None::<&[u8]>, Some(data))?;
        Ok(swapped.is_ok())
    }

    fn claim_invite(&self, token: &InviteToken) -> Result<Option<Invite>> {
        self.invites
            .remove(token.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn pending_invites(&self) -> Result<usize> {
        Ok(self.invites.len())
    }
}

impl IdentityKeyStore for SledStorage {
    fn connect(&self, edge: &Connection) -> Result<bool> {
        let (a, b) = edge.endpoints();
        let forward = edge_key(a, b);
        let backward = edge_key(b, a);

        self.connections
            .transaction(|tree| -> ConflictableTransactionResult<bool, ()> {
                let existed = tree.insert(forward.as_slice(), EMPTY)?.is_some();
                tree.insert(backward.as_slice(), EMPTY)?;
                Ok(!existed)
            })
            .map_err(|err: TransactionError<()>| match err {
                TransactionError::Storage(e) => StorageError::Database(e),
                TransactionError::Abort(()) => {
                    StorageError::Transaction(format!("connect {edge}"))
                }
            })
    }

    fn list_connections(&self, handle: &Handle) -> Result<Vec<Handle>> {
        let prefix = source_prefix(handle);
        let mut peers = Vec::new();
        for item in self.connections.scan_prefix(&prefix) {
            let (key, _) = item?;
            peers.push(handle_from_bytes(&key[prefix.len()..]));
        }
        Ok(peers)
    }

    fn are_connected(&self, a: &Handle, b: &Handle) -> Result<bool> {
        Ok(self.connections.contains_key(edge_key(a, b))?)
    }

    fn connection_count(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.connections.iter() {
            let (key, _) = item?;
            let (source, target) = split_edge_key(&key)?;
            if source <= target {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// In-memory backend
#[derive(Default)]
pub struct MemoryStorage {
    invites: Arc<RwLock<HashMap<InviteToken, Invite>>>,
    connections: Arc<RwLock<HashMap<Handle, BTreeSet<Handle>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InviteStore for MemoryStorage {
    fn insert_invite(&self, invite: &Invite) -> Result<bool> {
        let mut invites = self.invites.write();
        if invites.contains_key(&invite.token) {
            return Ok(false);
        }
        invites.insert(invite.token.clone(), invite.clone());
        Ok(true)
    }

    fn claim_invite(&self, token: &InviteToken) -> Result<Option<Invite>> {
        Ok(self.invites.write().remove(token))
    }

    fn pending_invites(&self) -> Result<usize> {
        Ok(self.invites.read().len())
    }
}

impl IdentityKeyStore for MemoryStorage {
    fn connect(&self, edge: &Connection) -> Result<bool> {
        let (a, b) = edge.endpoints();
        let mut graph = self.connections.write();
        let created = graph.entry(a.clone()).or_default().insert(b.clone());
        graph.entry(b.clone()).or_default().insert(a.clone());
        Ok(created)
    }

    fn list_connections(&self, handle: &Handle) -> Result<Vec<Handle>> {
        Ok(self
            .connections
            .read()
            .get(handle)
            .map(|peers| peers.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn are_connected(&self, a: &Handle, b: &Handle) -> Result<bool> {
        Ok(self
            .connections
            .read()
            .get(a)
            .map(|peers| peers.contains(b))
            .unwrap_or(false))
    }

    fn connection_count(&self) -> Result<usize> {
        Ok(self
            .connections
            .read()
            .iter()
            .map(|(source, peers)| peers.iter().filter(|target| source <= *target).count())
            .sum())
    }
}
