use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;
use uuid::Uuid;

use super::{handlers::ACCESS_COOKIE, jwt::JwtKeys};
use crate::error::AppError;

/// Extracts and validates the access JWT, returning the user ID.
///
/// The token is read from `Authorization: Bearer` first, then from the
/// `access_token` cookie.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);

        let bearer = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .map(str::to_owned);

        let token = match bearer {
            Some(t) => t,
            None => CookieJar::from_headers(&parts.headers)
                .get(ACCESS_COOKIE)
                .map(|c| c.value().to_owned())
                .ok_or(AppError::Unauthorized)?,
        };

        let claims = keys.verify(&token).map_err(|_| {
            warn!("invalid or expired access token");
            AppError::Unauthorized
        })?;

        Ok(AuthUser(claims.sub))
    }
}
