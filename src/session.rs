use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppError;

pub const USER_ID: &str = "user_id";

/// Identity the session layer attached to this request. Everything past the
/// extractor trusts it; issuing sessions is not this crate's business.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, err)| AppError::Internal(anyhow::anyhow!(err)))?;

        let Some(user_id) = session.get::<String>(USER_ID).await? else {
            return Err(AppError::Unauthorized);
        };

        let user_id = Uuid::parse_str(&user_id).map_err(|_| AppError::Unauthorized)?;
        Ok(AuthedUser(user_id))
    }
}
