use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use hearth_db::Database;
use hearth_db::models::{NewPoll, PollRow, VoteOutcome};
use hearth_types::api::{CreatePollRequest, PollView, VoteRequest};
use hearth_types::events::GatewayEvent;
use hearth_types::models::SessionUser;

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::{AppState, AppStateInner};
use crate::views;

pub async fn create_poll(
    state: &AppStateInner,
    user: &SessionUser,
    req: CreatePollRequest,
) -> ApiResult<PollView> {
    let Some(family) = user.family_id.clone() else {
        return Err(ApiError::Validation("Join a family before creating polls.".into()));
    };

    let question = req.question.trim().to_string();
    let options: Vec<(String, String)> = req
        .options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(|o| (Uuid::new_v4().to_string(), o.to_string()))
        .collect();
    if question.is_empty() || options.len() < 2 {
        return Err(ApiError::Validation(
            "A poll needs a question and at least two options.".into(),
        ));
    }

    let creator = user.id.to_string();
    let poll_id = Uuid::new_v4().to_string();
    let poll = state
        .db(move |db| {
            let now = hearth_db::format_timestamp(Utc::now());
            db.create_poll(
                &NewPoll {
                    id: &poll_id,
                    question: &question,
                    family_id: family.as_str(),
                    created_by: &creator,
                    created_at: &now,
                },
                &options,
            )?;
            let row = db
                .get_poll(&poll_id)?
                .ok_or_else(|| anyhow::anyhow!("Poll not found after insert: {}", poll_id))?;
            single_view(db, row)
        })
        .await?;

    info!("{} created poll {} in family {}", user.name, poll.id, poll.family_id);
    state
        .broadcaster
        .broadcast(&poll.family_id, GatewayEvent::NewPoll(poll.clone()));
    Ok(poll)
}

/// Active polls of the caller's family, newest first.
pub async fn list_polls(state: &AppStateInner, user: &SessionUser) -> ApiResult<Vec<PollView>> {
    let Some(family) = user.family_id.clone() else {
        return Ok(vec![]);
    };

    state
        .db(move |db| {
            let rows = db.get_active_family_polls(family.as_str())?;
            Ok(views::poll_views(db, rows)?)
        })
        .await
}

pub async fn poll_detail(state: &AppStateInner, user: &SessionUser, poll_id: Uuid) -> ApiResult<PollView> {
    let user = user.clone();
    state
        .db(move |db| {
            let row = family_poll(db, poll_id, &user)?;
            single_view(db, row)
        })
        .await
}

/// Move the caller's single vote on the poll to `option_id` and push the
/// whole poll to the family.
pub async fn vote(
    state: &AppStateInner,
    user: &SessionUser,
    poll_id: Uuid,
    option_id: Uuid,
) -> ApiResult<PollView> {
    let voter = user.clone();
    let poll = state
        .db(move |db| {
            let row = family_poll(db, poll_id, &voter)?;
            let now = hearth_db::format_timestamp(Utc::now());
            let outcome =
                db.cast_vote(&row.id, &option_id.to_string(), &voter.id.to_string(), &now)?;
            if outcome == VoteOutcome::UnknownOption {
                return Err(ApiError::NotFound("Poll option not found.".into()));
            }
            single_view(db, row)
        })
        .await?;

    state
        .broadcaster
        .broadcast(&poll.family_id, GatewayEvent::PollUpdated(poll.clone()));
    Ok(poll)
}

/// Load a poll and check it belongs to the caller's family.
fn family_poll(db: &Database, poll_id: Uuid, user: &SessionUser) -> ApiResult<PollRow> {
    let row = db
        .get_poll(&poll_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Poll not found.".into()))?;

    if user.family_id.as_ref().map(|f| f.as_str()) != Some(row.family_id.as_str()) {
        return Err(ApiError::Forbidden("This poll belongs to another family.".into()));
    }
    Ok(row)
}

fn single_view(db: &Database, row: PollRow) -> ApiResult<PollView> {
    let id = row.id.clone();
    views::poll_views(db, vec![row])?
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Poll view missing: {}", id)))
}

fn parse_poll_id(raw: &str) -> ApiResult<Uuid> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("Invalid poll id: {}", raw)))
}

// -- Handlers --

pub async fn post_poll(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ApiJson(req): ApiJson<CreatePollRequest>,
) -> ApiResult<impl IntoResponse> {
    let poll = create_poll(&state, &user, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "poll": poll })),
    ))
}

pub async fn get_polls(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<impl IntoResponse> {
    let polls = list_polls(&state, &user).await?;
    Ok(Json(serde_json::json!({ "success": true, "polls": polls })))
}

pub async fn get_poll(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(poll_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let poll = poll_detail(&state, &user, parse_poll_id(&poll_id)?).await?;
    Ok(Json(serde_json::json!({ "success": true, "poll": poll })))
}

pub async fn post_vote(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(poll_id): Path<String>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> ApiResult<impl IntoResponse> {
    let poll = vote(&state, &user, parse_poll_id(&poll_id)?, req.option_id).await?;
    Ok(Json(serde_json::json!({ "success": true, "poll": poll })))
}
