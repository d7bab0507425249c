use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use hearth_db::models::NewUser;
use hearth_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest};
use hearth_types::ids::FamilyId;
use hearth_types::models::Role;

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::middleware::SESSION_COOKIE;
use crate::state::{AppState, AppStateInner};

const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_TTL_DAYS: i64 = 30;

/// Create an account. An admin founds a new family and receives its code; a
/// child joins an existing family by code and is linked to that family's
/// admin as guardian. The new user is signed in right away.
pub async fn register_user(state: &AppStateInner, req: RegisterRequest) -> ApiResult<LoginResponse> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("A name and a valid email are required.".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }
    let family_code = req
        .family_code
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    match (req.role, &family_code) {
        (Role::Admin, Some(_)) => {
            return Err(ApiError::Validation(
                "Admins start a new family and cannot join one by code.".into(),
            ));
        }
        (Role::Child, None) => {
            return Err(ApiError::Validation("A family code is required.".into()));
        }
        _ => {}
    }

    // Hash password with Argon2id
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    let user_id = Uuid::new_v4();
    let role = req.role;
    let phone = req.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
    let account_name = name.clone();

    let family_id = state
        .db(move |db| {
            if db.get_user_by_email(&email)?.is_some() {
                return Err(ApiError::Conflict("Email is already registered.".into()));
            }

            let (family_id, parent_id) = match role {
                Role::Admin => (hex::encode(rand::random::<[u8; 8]>()), None),
                Role::Child => {
                    let code = family_code.unwrap_or_default();
                    let admin = db
                        .get_family_admin(&code)?
                        .ok_or_else(|| ApiError::Validation("Unknown family code.".into()))?;
                    (code, Some(admin.id))
                }
            };

            let created_at = hearth_db::format_timestamp(Utc::now());
            db.create_user(&NewUser {
                id: &user_id.to_string(),
                name: &account_name,
                email: &email,
                password_hash: &password_hash,
                role: role.as_str(),
                parent_id: parent_id.as_deref(),
                family_id: Some(&family_id),
                phone: phone.as_deref(),
                created_at: &created_at,
            })?;
            Ok(FamilyId::new(family_id))
        })
        .await?;

    info!("Registered {} ({}) as {} in family {}", name, user_id, role.as_str(), family_id);

    let token = create_token(&state.jwt_secret, user_id, &name)?;
    Ok(LoginResponse {
        user_id,
        name,
        family_id: Some(family_id),
        token,
    })
}

/// Verify credentials and issue a session token.
pub async fn login_user(state: &AppStateInner, req: LoginRequest) -> ApiResult<LoginResponse> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .db(move |db| Ok(db.get_user_by_email(&email)?))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password.".into()))?;

    // Verify password
    let stored = user.password.clone();
    let password = req.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await??;
    if !verified {
        return Err(ApiError::Unauthorized("Invalid email or password.".into()));
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id {}: {}", user.id, e))?;
    let token = create_token(&state.jwt_secret, user_id, &user.name)?;

    info!("{} ({}) logged in", user.name, user_id);
    Ok(LoginResponse {
        user_id,
        name: user.name,
        family_id: user.family_id.map(FamilyId::new),
        token,
    })
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let resp = register_user(&state, req).await?;
    let jar = jar.add(session_cookie(resp.token.clone(), state.cookie_secure));
    Ok((StatusCode::CREATED, jar, Json(resp)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let resp = login_user(&state, req).await?;
    let jar = jar.add(session_cookie(resp.token.clone(), state.cookie_secure));
    Ok((jar, Json(resp)))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(serde_json::json!({ "success": true })))
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub fn create_token(secret: &str, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
