use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use hearth_types::api::{FamilyPresenceResponse, MemberPresence};
use hearth_types::models::{PresenceStatus, SessionUser};

use crate::error::ApiResult;
use crate::state::{AppState, AppStateInner};
use crate::views;

/// Family members with their presence classified against the current time.
pub async fn family_presence(
    state: &AppStateInner,
    user: &SessionUser,
) -> ApiResult<FamilyPresenceResponse> {
    let Some(family) = user.family_id.clone() else {
        return Ok(FamilyPresenceResponse {
            online_count: 0,
            members: vec![],
        });
    };

    let rows = state
        .db(move |db| Ok(db.get_family_members(family.as_str())?))
        .await?;

    let now = Utc::now();
    let members = rows
        .into_iter()
        .map(|row| {
            let last_seen = row.last_seen.as_deref().map(views::parse_ts).transpose()?;
            Ok(MemberPresence {
                id: views::parse_uuid(&row.id)?,
                status: PresenceStatus::classify(row.is_online, last_seen, now),
                name: row.name,
                avatar: row.avatar_url,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let online_count = members
        .iter()
        .filter(|m| m.status == PresenceStatus::Online)
        .count();

    Ok(FamilyPresenceResponse {
        online_count,
        members,
    })
}

pub async fn get_members(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<impl IntoResponse> {
    let presence = family_presence(&state, &user).await?;
    Ok(Json(presence))
}
