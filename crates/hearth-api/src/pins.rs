use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use hearth_types::api::{PinNoteRequest, PinnedNoteView};
use hearth_types::events::GatewayEvent;
use hearth_types::ids::ChatRef;
use hearth_types::models::SessionUser;

use crate::chats::visible_chat;
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::messages::parse_chat_ref;
use crate::state::{AppState, AppStateInner};
use crate::views;

/// Append a pinned note to a persisted chat and push the chat's full note
/// list to the family.
pub async fn pin_note(
    state: &AppStateInner,
    user: &SessionUser,
    chat_ref: ChatRef,
    text: String,
) -> ApiResult<Vec<PinnedNoteView>> {
    let ChatRef::Persisted(chat_id) = chat_ref else {
        return Err(ApiError::Validation(
            "Notes can only be pinned to an existing chat.".into(),
        ));
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::Validation("Note text cannot be empty.".into()));
    }

    let pinner = user.clone();
    let notes = state
        .db(move |db| {
            let chat = visible_chat(db, chat_id, &pinner)?;
            let now = hearth_db::format_timestamp(Utc::now());
            db.add_pinned_note(
                &Uuid::new_v4().to_string(),
                &chat.id,
                &text,
                &pinner.id.to_string(),
                &now,
            )?;

            Ok(views::pinned_notes(db, &chat.id)?)
        })
        .await?;

    if let Some(family) = &user.family_id {
        state.broadcaster.broadcast(
            family,
            GatewayEvent::PinnedNotesUpdated {
                chat_id,
                pinned_notes: notes.clone(),
            },
        );
    }

    Ok(notes)
}

pub async fn post_pin(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(chat_id): Path<String>,
    ApiJson(req): ApiJson<PinNoteRequest>,
) -> ApiResult<impl IntoResponse> {
    let chat_ref = parse_chat_ref(&chat_id)?;
    let notes = pin_note(&state, &user, chat_ref, req.text).await?;
    Ok(Json(serde_json::json!({ "success": true, "pinnedNotes": notes })))
}
