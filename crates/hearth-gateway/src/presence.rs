use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use hearth_db::Database;
use hearth_types::events::GatewayEvent;
use hearth_types::models::SessionUser;

use crate::hub::{Broadcaster, Membership, RoomHub};

/// When a disconnect flips a user to offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresencePolicy {
    /// Any disconnect marks the user offline, even if another tab is still
    /// connected.
    #[default]
    LastDisconnectWins,
    /// Only the user's last open connection marks them offline.
    ConnectionCounted,
}

impl FromStr for PresencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-disconnect" => Ok(Self::LastDisconnectWins),
            "connection-counted" => Ok(Self::ConnectionCounted),
            other => Err(format!("unknown presence policy: {}", other)),
        }
    }
}

/// Keeps the stored online flag and last-seen time in step with socket
/// connections and tells the family when either changes.
#[derive(Clone)]
pub struct PresenceTracker {
    db: Arc<Database>,
    hub: RoomHub,
    policy: PresencePolicy,
}

impl PresenceTracker {
    pub fn new(db: Arc<Database>, hub: RoomHub, policy: PresencePolicy) -> Self {
        Self { db, hub, policy }
    }

    #[cfg(test)]
    pub(crate) fn hub(&self) -> &RoomHub {
        &self.hub
    }

    /// Mark the user online, seat the connection in the family room, then
    /// signal the room. A failed presence write is logged; the connection
    /// still proceeds.
    pub async fn connect(
        &self,
        user: &SessionUser,
    ) -> (Membership, mpsc::UnboundedReceiver<GatewayEvent>) {
        let db = self.db.clone();
        let uid = user.id.to_string();
        match tokio::task::spawn_blocking(move || db.set_user_online(&uid)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("DB error marking {} online: {}", user.id, e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }

        let (membership, rx) = self.hub.connect(user.id, user.family_id.clone());

        if let Some(family) = &user.family_id {
            self.hub.broadcast(family, GatewayEvent::DashboardUpdate);
        }

        (membership, rx)
    }

    /// Leave the room and, depending on the policy, mark the user offline
    /// with a fresh last-seen time. `None` means the connection never got
    /// as far as joining; nothing to undo.
    pub async fn disconnect(&self, membership: Option<Membership>) {
        let Some(membership) = membership else {
            debug!("Disconnect without a resolved user, nothing to update");
            return;
        };

        let remaining = self.hub.disconnect(&membership);
        if remaining > 0 && self.policy == PresencePolicy::ConnectionCounted {
            info!(
                "{} still has {} open connection(s), staying online",
                membership.user_id, remaining
            );
            return;
        }

        let db = self.db.clone();
        let uid = membership.user_id.to_string();
        let last_seen = hearth_db::format_timestamp(Utc::now());
        match tokio::task::spawn_blocking(move || db.set_user_offline(&uid, &last_seen)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("DB error marking {} offline: {}", membership.user_id, e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }

        if let Some(family) = &membership.family_id {
            self.hub.broadcast(family, GatewayEvent::DashboardUpdate);
        }
    }
}
