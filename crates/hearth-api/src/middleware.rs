use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};

use hearth_types::api::Claims;
use hearth_types::models::SessionUser;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, AppStateInner};
use crate::views;

/// Cookie carrying the session token, on REST requests and socket handshakes alike.
pub const SESSION_COOKIE: &str = "token";

pub fn decode_token(secret: &str, token: &str) -> ApiResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Invalid or expired session.".into()))?;
    Ok(token_data.claims)
}

/// Resolve a session token to the stored user behind it.
pub async fn resolve_session(state: &AppStateInner, token: &str) -> ApiResult<SessionUser> {
    let claims = decode_token(&state.jwt_secret, token)?;
    let uid = claims.sub.to_string();

    state
        .db(move |db| {
            let row = db
                .get_user_by_id(&uid)?
                .ok_or_else(|| ApiError::Unauthorized("User no longer exists.".into()))?;
            Ok(views::session_user(row)?)
        })
        .await
}

/// Extract the session token from the `token` cookie, falling back to an
/// `Authorization: Bearer` header.
pub fn session_token(jar: &CookieJar, req: &Request) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Authenticate the request and attach the resolved `SessionUser`.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(&jar, &req)
        .ok_or_else(|| ApiError::Unauthorized("User is not authenticated.".into()))?;

    let user = resolve_session(&state, &token).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
