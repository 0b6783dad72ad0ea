//! Authentication handlers: sessions, impersonation, bearer tokens and
//! account administration

use super::jwt::{parse_permissions, IssueRequest, IssuedToken};
use super::session::{auth_cookie, clear_auth_cookies, session_id, BEARER_COOKIE, SESSION_COOKIE};
use super::users::{LoginRequest, RegisterRequest, ResetConfirmRequest, ResetRequest, UserInfo};
use super::{AuthContext, PrincipalSource, ResolvedPrincipal};
use crate::error::ApiResult;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use warden_auth::{Permission, SessionPrincipal, UserSnapshot};
use warden_core::{ApiToken, TokenLookup, UserId, UserLookup, WardenError};

const COMPONENT: &str = "auth_handlers";

const RESET_REQUESTED: &str =
    "If the address belongs to an active account, a reset code has been sent";

/// Who the request runs as
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: UserId,
    pub actor_id: UserId,
    pub assumed: bool,
    pub username: Option<String>,
    /// Permissions held through roles
    pub permissions: Vec<String>,
    /// Every permission requirement the held set satisfies
    pub satisfies: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(flatten)]
    pub issue: IssueRequest,
    /// Also deliver the token as an HttpOnly cookie
    #[serde(default)]
    pub set_cookie: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct PermissionInfo {
    pub name: &'static str,
    pub sufficient: Vec<&'static str>,
}

/// User registration endpoint
pub async fn signup(
    State(state): State<AppState>,
    JsonExtractor(request): JsonExtractor<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserInfo>)> {
    let user = state.users.register(request).await?;
    Ok((StatusCode::CREATED, Json(UserInfo::from(&user))))
}

/// Verify credentials and start a fresh session
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonExtractor(request): JsonExtractor<LoginRequest>,
) -> ApiResult<(CookieJar, Json<UserInfo>)> {
    let user = state.users.login(request).await?;

    if let Some(previous) = session_id(&jar) {
        state.sessions.destroy(&previous).await;
    }
    let id = state
        .sessions
        .create(SessionPrincipal::login(UserSnapshot::new(
            user.id,
            user.username.clone(),
        )))
        .await;

    let jar = jar.add(auth_cookie(SESSION_COOKIE, id, state.secure_cookies()));
    Ok((jar, Json(UserInfo::from(&user))))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    if let Some(id) = session_id(&jar) {
        if let Some(principal) = state.sessions.get(&id, Utc::now()).await {
            if let Some(user) = principal.logged_in_user() {
                info!(user_id = %user.id, "User logged out");
            }
            // Requests still racing on this id see an anonymous principal.
            state.sessions.update(&id, principal.logout()).await;
        }
        state.sessions.destroy(&id).await;
    }
    (
        clear_auth_cookies(jar),
        Json(json!({ "message": "Logged out" })),
    )
}

pub async fn me(
    State(state): State<AppState>,
    principal: ResolvedPrincipal,
) -> ApiResult<Json<MeResponse>> {
    let username = match &principal.source {
        PrincipalSource::Session { principal, .. } => {
            principal.effective_user().map(|u| u.username.clone())
        }
        PrincipalSource::Bearer { .. } => None,
    };

    let view = describe(&state, principal.user_id, principal.actor_id, username).await?;
    Ok(Json(view))
}

/// Act as another user for the rest of the session
pub async fn assume(
    State(state): State<AppState>,
    principal: ResolvedPrincipal,
    Path(target): Path<i64>,
) -> ApiResult<Json<MeResponse>> {
    let (id, current) = session_only(&principal, "impersonation")?;

    let target = state
        .directory
        .find_user(&UserLookup::Id(UserId(target)))
        .await?
        .filter(|user| user.is_active())
        .ok_or_else(|| WardenError::not_found("user", COMPONENT))?;

    let next = current
        .assume(UserSnapshot::new(target.id, target.username.clone()))
        .map_err(|e| WardenError::validation(e.to_string(), "user_id", COMPONENT))?;
    store_transition(&state, id, next).await?;

    info!(actor_id = %principal.actor_id, user_id = %target.id, "User assumed");
    let view = describe(&state, target.id, principal.actor_id, Some(target.username)).await?;
    Ok(Json(view))
}

pub async fn release(
    State(state): State<AppState>,
    principal: ResolvedPrincipal,
) -> ApiResult<Json<MeResponse>> {
    let (id, current) = session_only(&principal, "release")?;

    let next = current
        .release()
        .map_err(|e| WardenError::validation(e.to_string(), "session", COMPONENT))?;
    let username = next.logged_in_user().map(|u| u.username.clone());
    store_transition(&state, id, next).await?;

    info!(actor_id = %principal.actor_id, released = %principal.user_id, "Assumed user released");
    let view = describe(&state, principal.actor_id, principal.actor_id, username).await?;
    Ok(Json(view))
}

/// Tokens belonging to the account whose credentials were verified
pub async fn list_tokens(
    State(state): State<AppState>,
    principal: ResolvedPrincipal,
) -> ApiResult<Json<Vec<ApiToken>>> {
    let tokens = state.tokens.get_tokens(principal.actor_id).await?;
    Ok(Json(tokens))
}

/// Mint a bearer token for the logged-in user, never an assumed one
pub async fn create_token(
    State(state): State<AppState>,
    jar: CookieJar,
    principal: ResolvedPrincipal,
    JsonExtractor(request): JsonExtractor<CreateTokenRequest>,
) -> ApiResult<(StatusCode, CookieJar, Json<IssuedToken>)> {
    session_only(&principal, "token issuance")?;

    let issued = state
        .issuer
        .issue(
            principal.actor_id,
            request.issue,
            state.tokens.as_ref(),
            state.directory.as_ref(),
        )
        .await?;

    let jar = if request.set_cookie {
        jar.add(auth_cookie(
            BEARER_COOKIE,
            issued.token.clone(),
            state.secure_cookies(),
        ))
    } else {
        jar
    };

    Ok((StatusCode::CREATED, jar, Json(issued)))
}

/// Revoke a token. Tokens the caller may not touch read as absent.
pub async fn delete_token(
    State(state): State<AppState>,
    principal: ResolvedPrincipal,
    Path(token_id): Path<String>,
) -> ApiResult<StatusCode> {
    let not_found = || WardenError::not_found("token", COMPONENT);

    let token = state
        .tokens
        .get_token(&TokenLookup::ById(token_id))
        .await?
        .ok_or_else(not_found)?;

    let owns = token.owner == principal.actor_id || token.owner == principal.user_id;
    if !owns {
        let held = parse_permissions(&state.directory.permission_names(principal.user_id).await?);
        if !state.engine.is_satisfied_by(Permission::AuthTokenAdmin, &held) {
            return Err(not_found().into());
        }
    }

    state.tokens.delete_token(&token).await?;
    info!(actor_id = %principal.actor_id, owner = %token.owner, token_name = %token.name, "Token revoked");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    JsonExtractor(request): JsonExtractor<ResetRequest>,
) -> ApiResult<Json<Value>> {
    state.users.request_reset(request).await?;
    Ok(Json(json!({ "message": RESET_REQUESTED })))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    JsonExtractor(request): JsonExtractor<ResetConfirmRequest>,
) -> ApiResult<Json<Value>> {
    state.users.confirm_reset(request).await?;
    Ok(Json(json!({ "message": "Password updated" })))
}

/// The catalog with the sufficient set of every permission
pub async fn list_permissions(State(state): State<AppState>) -> Json<Vec<PermissionInfo>> {
    let catalog = Permission::ALL
        .iter()
        .map(|&permission| {
            let mut sufficient: Vec<&'static str> = state
                .engine
                .sufficient_permissions_for(permission)
                .iter()
                .map(|p| p.name())
                .collect();
            sufficient.sort_unstable();
            PermissionInfo {
                name: permission.name(),
                sufficient,
            }
        })
        .collect();
    Json(catalog)
}

pub async fn sweep_tokens(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Json<Value>> {
    let removed = state.tokens.delete_old_tokens(Utc::now()).await?;
    info!(actor_id = %ctx.principal.actor_id, removed, "Expired tokens swept on request");
    Ok(Json(json!({ "removed": removed })))
}

pub async fn set_user_enabled(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
    JsonExtractor(request): JsonExtractor<SetEnabledRequest>,
) -> ApiResult<Json<Value>> {
    let user_id = UserId(user_id);
    state.directory.set_enabled(user_id, request.enabled).await?;
    info!(
        actor_id = %ctx.principal.actor_id,
        %user_id,
        enabled = request.enabled,
        "User enabled flag changed"
    );
    Ok(Json(json!({ "user_id": user_id, "enabled": request.enabled })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .directory
        .soft_delete(UserId(user_id), ctx.principal.actor_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn session_only<'a>(
    principal: &'a ResolvedPrincipal,
    action: &str,
) -> Result<(&'a str, &'a SessionPrincipal), WardenError> {
    match &principal.source {
        PrincipalSource::Session {
            session_id,
            principal,
        } => Ok((session_id.as_str(), principal)),
        PrincipalSource::Bearer { .. } => Err(WardenError::validation(
            format!("{} requires an interactive session", action),
            "credential",
            COMPONENT,
        )),
    }
}

async fn store_transition(
    state: &AppState,
    id: &str,
    next: SessionPrincipal,
) -> Result<(), WardenError> {
    if state.sessions.update(id, next).await {
        Ok(())
    } else {
        Err(WardenError::authentication("session expired during transition", COMPONENT))
    }
}

async fn describe(
    state: &AppState,
    user_id: UserId,
    actor_id: UserId,
    username: Option<String>,
) -> Result<MeResponse, WardenError> {
    let held = parse_permissions(&state.directory.permission_names(user_id).await?);

    let mut permissions: Vec<String> = held.iter().map(|p| p.name().to_string()).collect();
    permissions.sort();
    let mut satisfies: Vec<&'static str> = state
        .engine
        .granted_by(&held)
        .into_iter()
        .map(Permission::name)
        .collect();
    satisfies.sort_unstable();

    Ok(MeResponse {
        user_id,
        actor_id,
        assumed: user_id != actor_id,
        username,
        permissions,
        satisfies,
    })
}
