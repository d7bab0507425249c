use std::collections::BTreeMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use hearth_db::models::NewMessage;
use hearth_types::api::{
    ConversationView, MarkReadResponse, MessageView, ReactRequest, ReactionsResponse,
    SendMessageRequest,
};
use hearth_types::events::GatewayEvent;
use hearth_types::ids::ChatRef;
use hearth_types::models::SessionUser;

use crate::chats::visible_chat;
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::{AppState, AppStateInner};
use crate::views;

const MAX_REACTION_CHARS: usize = 16;

/// Parse a conversation reference taken from a URL path.
pub(crate) fn parse_chat_ref(raw: &str) -> ApiResult<ChatRef> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("Invalid chat id: {}", raw)))
}

/// Persist a message and fan it out to the sender's family.
///
/// A virtual reference is materialized into a one-on-one chat first; in that
/// case `virtual_chat_created` is broadcast ahead of `new_message` so clients
/// can retarget the virtual id before the message lands. All validation runs
/// before the first write and nothing is broadcast unless the write succeeded.
pub async fn send_message(
    state: &AppStateInner,
    user: &SessionUser,
    req: SendMessageRequest,
) -> ApiResult<MessageView> {
    let Some(family) = user.family_id.clone() else {
        return Err(ApiError::Validation("Join a family before sending messages.".into()));
    };
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Message content cannot be empty.".into()));
    }

    if let ChatRef::Virtual(counterpart) = req.chat_id {
        let Some(recipient) = req.recipient_id else {
            return Err(ApiError::Validation(
                "recipientId is required to start a new conversation.".into(),
            ));
        };
        if recipient != counterpart {
            return Err(ApiError::Validation(
                "recipientId does not match the conversation.".into(),
            ));
        }
        if recipient == user.id {
            return Err(ApiError::Validation("You cannot message yourself.".into()));
        }
        if req.reply_to.is_some() {
            return Err(ApiError::Validation(
                "A new conversation has no message to reply to.".into(),
            ));
        }
    }

    let sender = user.clone();
    let chat_ref = req.chat_id;
    let content = req.content;
    let reply_to = req.reply_to;
    let message_id = Uuid::new_v4();
    let new_chat_id = Uuid::new_v4().to_string();

    let (message, materialized) = state
        .db(move |db| {
            let sender_id = sender.id.to_string();
            let now = hearth_db::format_timestamp(Utc::now());

            let (chat, created) = match chat_ref {
                ChatRef::Virtual(counterpart) => {
                    let recipient = db
                        .get_user_by_id(&counterpart.to_string())?
                        .ok_or_else(|| ApiError::NotFound("Recipient not found.".into()))?;
                    if recipient.family_id.as_deref() != Some(family.as_str()) {
                        return Err(ApiError::Forbidden(
                            "Recipient is not in your family.".into(),
                        ));
                    }
                    db.get_or_create_direct_chat(&new_chat_id, &sender_id, &recipient.id, &now)?
                }
                ChatRef::Persisted(chat_id) => {
                    let chat = visible_chat(db, chat_id, &sender)?;
                    if let Some(target) = reply_to {
                        let in_chat = db
                            .get_message(&target.to_string())?
                            .is_some_and(|m| m.chat_id == chat.id);
                        if !in_chat {
                            return Err(ApiError::Validation(
                                "Reply target is not in this chat.".into(),
                            ));
                        }
                    }
                    (chat, false)
                }
            };

            let mid = message_id.to_string();
            let reply = reply_to.map(|id| id.to_string());
            db.insert_message(&NewMessage {
                id: &mid,
                chat_id: &chat.id,
                sender_id: &sender_id,
                content: &content,
                reply_to: reply.as_deref(),
                family_id: family.as_str(),
                created_at: &now,
            })?;
            db.set_latest_message(&chat.id, &mid, &now)?;

            let chat = db
                .get_chat(&chat.id)?
                .ok_or_else(|| anyhow::anyhow!("Chat vanished after write: {}", chat.id))?;
            let chat_view = views::conversation_view(db, chat, sender.id)?;

            let row = db
                .get_message(&mid)?
                .ok_or_else(|| anyhow::anyhow!("Message not found after insert: {}", mid))?;
            let mut message = views::message_views(db, vec![row])?
                .pop()
                .ok_or_else(|| anyhow::anyhow!("Message view missing: {}", mid))?;
            message.chat = Some(chat_view.clone());

            let materialized: Option<ConversationView> = created.then_some(chat_view);
            Ok((message, materialized))
        })
        .await?;

    if let Some(family) = &user.family_id {
        if let Some(new_chat) = materialized {
            info!(
                "Materialized {} into chat {} for {}",
                chat_ref, new_chat.id, user.id
            );
            state.broadcaster.broadcast(
                family,
                GatewayEvent::VirtualChatCreated {
                    virtual_id: chat_ref,
                    new_chat,
                },
            );
        }
        state
            .broadcaster
            .broadcast(family, GatewayEvent::NewMessage(message.clone()));
    }

    Ok(message)
}

/// Chat history, oldest first. Virtual chats have none and are not looked up.
pub async fn chat_history(
    state: &AppStateInner,
    user: &SessionUser,
    chat_ref: ChatRef,
) -> ApiResult<Vec<MessageView>> {
    let ChatRef::Persisted(chat_id) = chat_ref else {
        return Ok(vec![]);
    };

    let user = user.clone();
    state
        .db(move |db| {
            let chat = visible_chat(db, chat_id, &user)?;
            let rows = db.get_messages(&chat.id)?;
            Ok(views::message_views(db, rows)?)
        })
        .await
}

/// Add the caller to the readers of every message in the chat. Returns how
/// many messages were newly marked.
pub async fn mark_read(state: &AppStateInner, user: &SessionUser, chat_ref: ChatRef) -> ApiResult<usize> {
    let ChatRef::Persisted(chat_id) = chat_ref else {
        return Ok(0);
    };

    let user = user.clone();
    let marked = state
        .db(move |db| {
            let chat = visible_chat(db, chat_id, &user)?;
            Ok(db.mark_chat_read(&chat.id, &user.id.to_string())?)
        })
        .await?;

    debug!("Marked {} message(s) read in {}", marked, chat_id);
    Ok(marked)
}

/// Bump the counter for `symbol` on a message and return every counter.
pub async fn react(
    state: &AppStateInner,
    user: &SessionUser,
    message_id: Uuid,
    symbol: String,
) -> ApiResult<BTreeMap<String, i64>> {
    let symbol = symbol.trim().to_string();
    let len = symbol.chars().count();
    if len == 0 || len > MAX_REACTION_CHARS {
        return Err(ApiError::Validation(format!(
            "Reaction must be 1 to {} characters.",
            MAX_REACTION_CHARS
        )));
    }

    let user = user.clone();
    state
        .db(move |db| {
            let message = db
                .get_message(&message_id.to_string())?
                .ok_or_else(|| ApiError::NotFound("Message not found.".into()))?;
            let chat_id = views::parse_uuid(&message.chat_id)?;
            visible_chat(db, chat_id, &user)?;

            let counters = db
                .add_reaction(&message.id, &symbol)?
                .into_iter()
                .map(|r| (r.symbol, r.count))
                .collect();
            Ok(counters)
        })
        .await
}

// -- Handlers --

pub async fn post_message(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = send_message(&state, &user, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "message": message })),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(chat_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let chat_ref = parse_chat_ref(&chat_id)?;
    let messages = chat_history(&state, &user, chat_ref).await?;
    Ok(Json(serde_json::json!({ "success": true, "messages": messages })))
}

pub async fn put_read(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(chat_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let chat_ref = parse_chat_ref(&chat_id)?;
    let marked = mark_read(&state, &user, chat_ref).await?;
    Ok(Json(MarkReadResponse { marked }))
}

pub async fn post_reaction(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(message_id): Path<String>,
    ApiJson(req): ApiJson<ReactRequest>,
) -> ApiResult<impl IntoResponse> {
    let message_id: Uuid = message_id
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid message id: {}", message_id)))?;
    let reactions = react(&state, &user, message_id, req.symbol).await?;
    Ok(Json(ReactionsResponse { reactions }))
}
