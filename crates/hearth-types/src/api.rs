use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{ChatRef, FamilyId};
use crate::models::{AlertStatus, GeoPoint, PresenceStatus, Role};

// -- JWT Claims --

/// Session token claims, shared by the REST middleware and the socket
/// handshake so both channels resolve the same credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub family_code: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub family_id: Option<FamilyId>,
    pub token: String,
}

// -- Users --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberPresence {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
    pub status: PresenceStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyPresenceResponse {
    pub online_count: usize,
    pub members: Vec<MemberPresence>,
}

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedNoteView {
    pub text: String,
    pub pinned_by: UserSummary,
    pub pinned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub id: Uuid,
    pub content: String,
    pub sender: UserSummary,
    pub created_at: DateTime<Utc>,
}

/// A conversation as listed to a client. Virtual conversations carry a
/// `virtual-` id, no latest message and no pinned notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: ChatRef,
    pub chat_name: String,
    pub is_group_chat: bool,
    pub is_virtual: bool,
    pub users: Vec<UserSummary>,
    pub latest_message: Option<MessagePreview>,
    pub pinned_notes: Vec<PinnedNoteView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    pub chat_id: ChatRef,
    pub recipient_id: Option<Uuid>,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: UserSummary,
    pub content: String,
    pub reply_to: Option<Uuid>,
    pub reactions: BTreeMap<String, i64>,
    pub read_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Populated on send and on the `new_message` event, omitted in history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<ConversationView>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionsResponse {
    pub reactions: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinNoteRequest {
    pub text: String,
}

// -- Polls --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct VoteRequest {
    pub option_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOptionView {
    pub id: Uuid,
    pub text: String,
    pub votes: Vec<UserSummary>,
    pub percentage: f64,
}

/// Full poll state. Sent whole on every update so clients never merge diffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<PollOptionView>,
    pub family_id: FamilyId,
    pub created_by: UserSummary,
    pub is_active: bool,
    pub total_votes: usize,
    pub created_at: DateTime<Utc>,
}

// -- Emergency --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerAlertRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertView {
    pub id: Uuid,
    pub triggered_by: UserSummary,
    pub family_id: FamilyId,
    pub location: GeoPoint,
    pub status: AlertStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAlertResponse {
    pub alert: AlertView,
    /// Emergency contacts that were sent an SMS/voice notification. Zero
    /// means nobody outside the app was reached.
    pub notified_contacts: usize,
}
