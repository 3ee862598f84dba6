//! Live connection registry: which socket currently speaks for which user.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use commune_shared::protocol::ServerFrame;
use commune_shared::types::UserId;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of one realtime socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Cheap-to-clone handle for pushing frames to one connection.
///
/// Every frame for a connection goes through its single bounded queue, so
/// a recipient sees frames in the order they were pushed.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: UserId,
    sender: mpsc::Sender<ServerFrame>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(user_id: UserId, queue: usize) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (sender, rx) = mpsc::channel(queue);
        let handle = Self {
            id: ConnectionId::next(),
            user_id,
            sender,
        };
        (handle, rx)
    }

    /// Queue a frame without waiting. A full or closed queue drops the frame.
    pub fn push(&self, frame: ServerFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = %self.id, user = %self.user_id, "Dropping frame for slow connection");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn = %self.id, user = %self.user_id, "Connection already closed");
                false
            }
        }
    }
}

/// At most one live connection per user; the newest one wins.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `handle` with its user, replacing any earlier connection.
    /// Returns the superseded handle, if there was one.
    pub async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let user = handle.user_id;
        let conn = handle.id;
        let previous = self.connections.write().await.insert(user, handle);

        match &previous {
            Some(old) => info!(user = %user, %conn, superseded = %old.id, "Connection replaced"),
            None => info!(user = %user, %conn, "Connection registered"),
        }
        previous
    }

    /// Drop the user's entry if it still belongs to connection `conn`.
    pub async fn unregister(&self, user: UserId, conn: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&user) {
            Some(current) if current.id == conn => {
                connections.remove(&user);
                info!(user = %user, %conn, "Connection unregistered");
                true
            }
            _ => false,
        }
    }

    /// The user's live connection. `None` means offline.
    pub async fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&user).cloned()
    }

    /// Every connected user, sorted for stable output.
    pub async fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.connections.read().await.keys().copied().collect();
        users.sort();
        users
    }

    /// Push a frame to every live connection.
    pub async fn broadcast(&self, frame: &ServerFrame) {
        let connections = self.connections.read().await;
        for handle in connections.values() {
            handle.push(frame.clone());
        }
    }
}
