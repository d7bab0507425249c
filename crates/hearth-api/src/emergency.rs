use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use hearth_db::Database;
use hearth_db::models::{NewAlert, UserRow};
use hearth_types::api::{AlertView, TriggerAlertRequest, TriggerAlertResponse};
use hearth_types::events::GatewayEvent;
use hearth_types::models::{Role, SessionUser};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::notify::NotifyTarget;
use crate::state::{AppState, AppStateInner};
use crate::views;

/// Raise an alert for the caller. Fails with a conflict while they already
/// have an active one.
///
/// The realtime `new-alert` goes out first; SMS/voice runs detached and can
/// neither fail nor delay the request.
pub async fn trigger(
    state: &AppStateInner,
    user: &SessionUser,
    req: TriggerAlertRequest,
) -> ApiResult<TriggerAlertResponse> {
    let Some(family) = user.family_id.clone() else {
        return Err(ApiError::Validation("Join a family before raising alerts.".into()));
    };
    if !valid_location(req.lat, req.lng) {
        return Err(ApiError::Validation("Location is out of range.".into()));
    }

    let caller = user.clone();
    let alert_id = Uuid::new_v4().to_string();
    let (alert, targets) = state
        .db(move |db| {
            let now = hearth_db::format_timestamp(Utc::now());
            let inserted = db.insert_alert(&NewAlert {
                id: &alert_id,
                triggered_by: &caller.id.to_string(),
                family_id: family.as_str(),
                lat: req.lat,
                lng: req.lng,
                created_at: &now,
            })?;
            if !inserted {
                return Err(ApiError::Conflict("You already have an active alert.".into()));
            }

            let row = db
                .get_alert(&alert_id)?
                .ok_or_else(|| anyhow::anyhow!("Alert not found after insert: {}", alert_id))?;
            let targets = notify_targets(db, &caller)?;
            Ok((views::alert_view(row)?, targets))
        })
        .await?;

    info!(
        "{} triggered alert {} at {},{}",
        user.name, alert.id, alert.location.lat, alert.location.lng
    );
    state
        .broadcaster
        .broadcast(&alert.family_id, GatewayEvent::NewAlert(alert.clone()));

    let notified_contacts = state.notifier.reachable(&targets);
    if notified_contacts == 0 {
        warn!(
            "Alert {} has no reachable emergency contacts ({} candidate(s))",
            alert.id,
            targets.len()
        );
    }
    tokio::spawn(state.notifier.notify(alert.clone(), targets));

    Ok(TriggerAlertResponse {
        alert,
        notified_contacts,
    })
}

/// Resolve the caller's own active alert.
pub async fn resolve(state: &AppStateInner, user: &SessionUser) -> ApiResult<AlertView> {
    let uid = user.id.to_string();
    let alert = state
        .db(move |db| {
            let now = hearth_db::format_timestamp(Utc::now());
            let row = db
                .resolve_active_alert(&uid, &now)?
                .ok_or_else(|| ApiError::NotFound("No active alert to resolve.".into()))?;
            Ok(views::alert_view(row)?)
        })
        .await?;

    info!("{} resolved alert {}", user.name, alert.id);
    state.broadcaster.broadcast(
        &alert.family_id,
        GatewayEvent::AlertResolved {
            alert_id: alert.id,
            resolved_by: user.name.clone(),
        },
    );
    Ok(alert)
}

/// Every alert of the caller's family, newest first.
pub async fn history(state: &AppStateInner, user: &SessionUser) -> ApiResult<Vec<AlertView>> {
    let Some(family) = user.family_id.clone() else {
        return Ok(vec![]);
    };

    state
        .db(move |db| {
            let alerts = db
                .get_family_alerts(family.as_str())?
                .into_iter()
                .map(views::alert_view)
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(alerts)
        })
        .await
}

/// A child with a guardian notifies the guardian. An admin notifies every
/// child of the family.
fn notify_targets(db: &Database, user: &SessionUser) -> anyhow::Result<Vec<NotifyTarget>> {
    let rows: Vec<UserRow> = match user.role {
        Role::Child => match user.parent_id {
            Some(parent) => db.get_user_by_id(&parent.to_string())?.into_iter().collect(),
            None => vec![],
        },
        Role::Admin => match &user.family_id {
            Some(family) => db.get_family_children(family.as_str())?,
            None => vec![],
        },
    };

    rows.into_iter()
        .map(|row| {
            Ok(NotifyTarget {
                user_id: views::parse_uuid(&row.id)?,
                name: row.name,
                phone: row.phone.filter(|p| !p.trim().is_empty()),
            })
        })
        .collect()
}

fn valid_location(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

// -- Handlers --

pub async fn post_trigger(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ApiJson(req): ApiJson<TriggerAlertRequest>,
) -> ApiResult<impl IntoResponse> {
    let resp = trigger(&state, &user, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "alert": resp.alert,
            "notifiedContacts": resp.notified_contacts,
        })),
    ))
}

pub async fn post_resolve(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<impl IntoResponse> {
    let alert = resolve(&state, &user).await?;
    Ok(Json(serde_json::json!({ "success": true, "alert": alert })))
}

pub async fn get_history(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<impl IntoResponse> {
    let alerts = history(&state, &user).await?;
    Ok(Json(serde_json::json!({ "success": true, "alerts": alerts })))
}
