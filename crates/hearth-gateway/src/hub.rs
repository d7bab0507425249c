use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use hearth_types::events::GatewayEvent;
use hearth_types::ids::FamilyId;

/// Delivers events to every connection in a family's room.
///
/// REST handlers only see this trait, so the in-process `RoomHub` can be
/// replaced by a pub/sub backend without touching them.
pub trait Broadcaster: Send + Sync {
    /// Returns the number of connections the event was handed to.
    fn broadcast(&self, family_id: &FamilyId, event: GatewayEvent) -> usize;
}

/// A live socket's seat in the hub. Returned by `connect`, handed back to
/// `disconnect`.
#[derive(Debug, Clone)]
pub struct Membership {
    pub conn_id: Uuid,
    pub user_id: Uuid,
    pub family_id: Option<FamilyId>,
}

struct RoomMember {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

#[derive(Default)]
struct HubState {
    /// family_id -> (conn_id -> member)
    rooms: HashMap<FamilyId, HashMap<Uuid, RoomMember>>,

    /// user_id -> number of open connections
    connections: HashMap<Uuid, usize>,
}

/// Process-local room membership for all connected sockets.
#[derive(Clone, Default)]
pub struct RoomHub {
    inner: Arc<RwLock<HubState>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and seat it in its family's room. Users without
    /// a family are tracked but join no room. Returns the membership and the
    /// receiver that the connection drains.
    pub fn connect(
        &self,
        user_id: Uuid,
        family_id: Option<FamilyId>,
    ) -> (Membership, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *state.connections.entry(user_id).or_insert(0) += 1;
        if let Some(family) = &family_id {
            state
                .rooms
                .entry(family.clone())
                .or_default()
                .insert(conn_id, RoomMember { user_id, tx });
            debug!("Connection {} of {} joined room {}", conn_id, user_id, family);
        }

        (
            Membership {
                conn_id,
                user_id,
                family_id,
            },
            rx,
        )
    }

    /// Remove a connection from its room. Returns how many connections the
    /// user still has open.
    pub fn disconnect(&self, membership: &Membership) -> usize {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(family) = &membership.family_id {
            let now_empty = match state.rooms.get_mut(family) {
                Some(room) => {
                    room.remove(&membership.conn_id);
                    room.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.rooms.remove(family);
            }
        }

        let remaining = match state.connections.get_mut(&membership.user_id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            state.connections.remove(&membership.user_id);
        }
        remaining
    }

    #[cfg(test)]
    pub(crate) fn connection_count(&self, user_id: Uuid) -> usize {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state.connections.get(&user_id).copied().unwrap_or(0)
    }
}

impl Broadcaster for RoomHub {
    fn broadcast(&self, family_id: &FamilyId, event: GatewayEvent) -> usize {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let Some(room) = state.rooms.get(family_id) else {
            trace!("No sockets in room {} for {}", family_id, event.name());
            return 0;
        };

        // A closed receiver means the connection is tearing down; it leaves
        // the room on its own.
        let delivered = room
            .values()
            .filter(|member| match member.tx.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    trace!("Skipping closed socket of {} in room {}", member.user_id, family_id);
                    false
                }
            })
            .count();
        trace!("{} delivered to {} sockets in room {}", event.name(), delivered, family_id);
        delivered
    }
}
