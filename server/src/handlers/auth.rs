//! Caller identity. Authentication happens upstream; the gateway forwards
//! the verified user as `X-User-Id` and `X-User-Role`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::models::{Actor, UserRole};
use crate::utils::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::AuthError(format!("Missing {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| AppError::AuthError(format!("Invalid {USER_ID_HEADER} header")))?;
        let role = header(parts, USER_ROLE_HEADER)?
            .parse::<UserRole>()
            .map_err(AppError::AuthError)?;

        Ok(Actor::new(user_id, role))
    }
}

/// An [`Actor`] with the admin role.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;
        if !actor.is_admin() {
            return Err(AppError::Forbidden("Admin role required".to_string()));
        }
        Ok(Self(actor))
    }
}
