use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use hearth_db::Database;
use hearth_db::models::ChatRow;
use hearth_types::api::{ConversationView, UserSummary};
use hearth_types::models::SessionUser;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, AppStateInner};
use crate::views::{self, GROUP_CHAT_NAME};

/// Every conversation the caller sees: the family group chat, each persisted
/// one-on-one chat, and a virtual stand-in for every family member they have
/// not talked to yet. Newest activity first.
///
/// Only writes when the family group chat does not exist yet.
pub async fn list_conversations(
    state: &AppStateInner,
    user: &SessionUser,
) -> ApiResult<Vec<ConversationView>> {
    let Some(family) = user.family_id.clone() else {
        return Ok(vec![]);
    };

    let viewer = user.id;
    let viewer_name = user.name.clone();
    let group_id = Uuid::new_v4().to_string();
    let now = hearth_db::format_timestamp(Utc::now());

    let (conversations, created) = state
        .db(move |db| {
            let viewer_id = viewer.to_string();
            let members = db.get_family_members(family.as_str())?;
            let member_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();

            let (group, created) = db.get_or_create_group_chat(
                &group_id,
                family.as_str(),
                GROUP_CHAT_NAME,
                &viewer_id,
                &member_ids,
                &now,
            )?;

            let me = match members.iter().find(|m| m.id == viewer_id) {
                Some(row) => views::user_summary(row)?,
                None => UserSummary {
                    id: viewer,
                    name: viewer_name,
                    avatar: None,
                },
            };

            let mut conversations = vec![views::conversation_view(db, group, viewer)?];
            for member in members.iter().filter(|m| m.id != viewer_id) {
                let view = match db.find_direct_chat(&viewer_id, &member.id)? {
                    Some(chat) => views::conversation_view(db, chat, viewer)?,
                    None => views::virtual_conversation(me.clone(), member)?,
                };
                conversations.push(view);
            }

            conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok((conversations, created))
        })
        .await?;

    if created {
        if let Some(family) = &user.family_id {
            info!("Created group chat for family {}", family);
        }
    }

    Ok(conversations)
}

/// Load a persisted chat the caller is allowed to use.
pub(crate) fn visible_chat(db: &Database, chat_id: Uuid, user: &SessionUser) -> ApiResult<ChatRow> {
    let chat = db
        .get_chat(&chat_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Chat not found.".into()))?;

    if !views::chat_visible(db, &chat, user)? {
        return Err(ApiError::Forbidden("You are not a member of this chat.".into()));
    }
    Ok(chat)
}

pub async fn get_chats(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<impl IntoResponse> {
    let chats = list_conversations(&state, &user).await?;
    Ok(Json(serde_json::json!({ "success": true, "chats": chats })))
}
