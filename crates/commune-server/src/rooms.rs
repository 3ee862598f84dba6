use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use commune_shared::types::GroupId;

use crate::registry::{ConnectionHandle, ConnectionId};

type Room = HashMap<ConnectionId, ConnectionHandle>;

/// In-memory group channel subscriptions, keyed by connection.
///
/// Nothing here is persisted; clients re-join their rooms after
/// reconnecting. A room disappears once its last connection leaves.
#[derive(Clone, Default)]
pub struct RoomTracker {
    rooms: Arc<RwLock<HashMap<GroupId, Room>>>,
}

impl RoomTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection. Returns `false` if it was already in the room.
    pub async fn join(&self, handle: &ConnectionHandle, group: GroupId) -> bool {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(group).or_default();
        let added = room.insert(handle.id, handle.clone()).is_none();

        debug!(
            group = %group,
            conn = %handle.id,
            members = room.len(),
            "Connection joined room"
        );
        added
    }

    /// Unsubscribe a connection from one room.
    pub async fn leave(&self, conn: ConnectionId, group: GroupId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&group) else {
            return false;
        };
        let removed = room.remove(&conn).is_some();
        if room.is_empty() {
            rooms.remove(&group);
            debug!(group = %group, "Removed empty room");
        }
        removed
    }

    /// Drop a connection from every room. Called on disconnect.
    pub async fn leave_all(&self, conn: ConnectionId) -> usize {
        let mut rooms = self.rooms.write().await;
        let mut left = 0;
        rooms.retain(|_, room| {
            if room.remove(&conn).is_some() {
                left += 1;
            }
            !room.is_empty()
        });

        if left > 0 {
            info!(%conn, rooms = left, "Connection left all rooms");
        }
        left
    }

    /// Snapshot of the connections subscribed to `group`.
    pub async fn members_of(&self, group: GroupId) -> Vec<ConnectionHandle> {
        self.rooms
            .read()
            .await
            .get(&group)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }
}
