use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    WithRejection,
};
use time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            LoginRequest, MessageResponse, PasswordResetRequest, RefreshRequest,
            RegisterRequest, RegisteredResponse, ResetPasswordRequest, TokenResponse,
        },
        extractors::AuthUser,
        services::{is_valid_email, normalize_email, required, required_secret},
        tokens::TokenPair,
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", get(logout))
        .route("/api/auth/secret", get(secret))
        .route("/api/auth/password-reset-request", post(request_password_reset))
        .route("/api/auth/reset-password", post(reset_password))
}

fn session_cookie(
    name: &'static str,
    value: String,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(max_age)
        .build()
}

fn with_session_cookies(jar: CookieJar, state: &AppState, pair: &TokenPair) -> CookieJar {
    let secure = state.config.cookie_secure;
    jar.add(session_cookie(
        ACCESS_COOKIE,
        pair.access_token.clone(),
        state.tokens.access_ttl(),
        secure,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        pair.refresh_token.clone(),
        state.tokens.refresh_ttl(),
        secure,
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<(CookieJar, Json<Uuid>)> {
    let email = required(payload.email, "email")?;
    let password = required_secret(payload.password, "password")?;
    let user = state.accounts.authenticate(&email, &password).await?;
    let pair = state.tokens.issue_tokens(&user).await?;
    Ok((with_session_cookies(jar, &state, &pair), Json(user.id)))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> AppResult<Json<RegisteredResponse>> {
    let user = state.accounts.register(payload).await?;
    Ok(Json(RegisteredResponse { id: user.id }))
}

#[instrument(skip(state, jar, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let presented = payload
        .and_then(|Json(body)| body.refresh_token)
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_owned()))
        .ok_or(AppError::Unauthorized)?;

    let (user, pair) = state.tokens.refresh_tokens(&presented).await?;
    let jar = with_session_cookies(jar, &state, &pair);
    Ok((
        jar,
        Json(TokenResponse {
            user_id: user.id,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<&'static str>)> {
    let access = jar.get(ACCESS_COOKIE).map(|c| c.value().to_owned());
    let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_owned());

    let (Some(access), Some(refresh)) = (access, refresh) else {
        return Err(AppError::BadRequest("No tokens found.".into()));
    };
    if access.is_empty() || refresh.is_empty() {
        return Err(AppError::BadRequest("No tokens found.".into()));
    }

    state.tokens.revoke_on_logout(&refresh).await?;
    info!("user logged out");

    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    Ok((jar, Json("Logged out successfully.")))
}

pub async fn secret(AuthUser(user_id): AuthUser) -> Json<&'static str> {
    debug!(user_id = %user_id, "secret accessed");
    Json("This is a secret message only for authenticated users.")
}

/// Always answers the same way; the reset itself runs on a spawned task so
/// response timing does not depend on whether the email exists.
#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<PasswordResetRequest>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    let email = normalize_email(&required(payload.email, "email")?);
    if !is_valid_email(&email) {
        warn!("password reset requested with malformed email");
        return Err(AppError::Validation("Invalid email.".into()));
    }

    let resets = state.resets.clone();
    tokio::spawn(async move {
        if let Err(e) = resets.request_reset(&email).await {
            error!(error = %e, "password reset request failed");
        }
    });

    Ok(Json(MessageResponse {
        message: "If the email exists, a reset link has been sent.",
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<ResetPasswordRequest>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    let token = required(payload.token, "token")?;
    let new_password = required_secret(payload.new_password, "newPassword")?;
    let redeemed = state.resets.redeem_reset(&token, &new_password).await?;
    if !redeemed {
        return Err(AppError::BadRequest("Invalid or expired token.".into()));
    }
    Ok(Json(MessageResponse {
        message: "Password has been reset successfully.",
    }))
}
