use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{AlertView, ConversationView, MessageView, PinnedNoteView, PollView};
use crate::ids::ChatRef;

/// Events pushed to sockets in a family room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms the handshake credential was accepted
    #[serde(rename = "ready")]
    Ready { user_id: Uuid, name: String },

    /// A message was persisted
    #[serde(rename = "new_message")]
    NewMessage(MessageView),

    /// A virtual one-on-one chat was persisted; clients retarget `virtual_id`
    /// to `new_chat` before the first message arrives.
    #[serde(rename = "virtual_chat_created")]
    VirtualChatCreated {
        virtual_id: ChatRef,
        new_chat: ConversationView,
    },

    #[serde(rename = "new_poll")]
    NewPoll(PollView),

    #[serde(rename = "poll_updated")]
    PollUpdated(PollView),

    #[serde(rename = "pinned_notes_updated")]
    PinnedNotesUpdated {
        chat_id: Uuid,
        pinned_notes: Vec<PinnedNoteView>,
    },

    #[serde(rename = "new-alert")]
    NewAlert(AlertView),

    #[serde(rename = "alert-resolved")]
    AlertResolved { alert_id: Uuid, resolved_by: String },

    /// A family member came online or went offline; dashboards refetch
    #[serde(rename = "dashboardUpdate")]
    DashboardUpdate,
}

impl GatewayEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::NewMessage(_) => "new_message",
            Self::VirtualChatCreated { .. } => "virtual_chat_created",
            Self::NewPoll(_) => "new_poll",
            Self::PollUpdated(_) => "poll_updated",
            Self::PinnedNotesUpdated { .. } => "pinned_notes_updated",
            Self::NewAlert(_) => "new-alert",
            Self::AlertResolved { .. } => "alert-resolved",
            Self::DashboardUpdate => "dashboardUpdate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_type_and_data() {
        let alert_id = Uuid::new_v4();
        let json = serde_json::to_value(GatewayEvent::AlertResolved {
            alert_id,
            resolved_by: "Asha".into(),
        })
        .unwrap();

        assert_eq!(json["type"], "alert-resolved");
        assert_eq!(json["data"]["alertId"], alert_id.to_string());
        assert_eq!(json["data"]["resolvedBy"], "Asha");
    }

    #[test]
    fn dashboard_update_has_no_payload() {
        let json = serde_json::to_value(GatewayEvent::DashboardUpdate).unwrap();
        assert_eq!(json["type"], "dashboardUpdate");
        assert!(json.get("data").is_none());
        assert_eq!(GatewayEvent::DashboardUpdate.name(), "dashboardUpdate");
    }
}
