use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::db::models::MarketplaceUser;
use crate::db::MarketplaceRepository;
use crate::error::AppError;
use crate::AppState;

/// Claims of the access tokens issued by the marketplace auth provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Decode and validate a JWT, returning the claims
fn decode_jwt(secret: &str, token: &str) -> Result<Claims, AppError> {
    if secret.is_empty() {
        return Err(AppError::ServiceUnavailable(
            "Token validation is not configured".to_string(),
        ));
    }

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let auth_header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!("Missing or invalid Authorization header");
            AppError::Unauthorized
        })?;

    if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
        tracing::debug!("Authorization header doesn't start with 'Bearer '");
        return Err(AppError::Unauthorized);
    }

    let token = auth_header[7..].trim();
    if token.is_empty() {
        tracing::debug!("Empty bearer token in Authorization header");
        return Err(AppError::Unauthorized);
    }
    Ok(token)
}

// ============================================================================
// Extractors
// ============================================================================

/// The caller's user id, taken from a valid bearer token.
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = decode_jwt(&state.config.auth.jwt_secret, token).map_err(|e| {
            tracing::debug!("Rejected bearer token: {:?}", e);
            e
        })?;

        tracing::debug!("Authenticated user: {}", claims.sub);
        Ok(AuthUser(claims.sub))
    }
}

/// An authenticated caller whose marketplace role is `admin`.
pub struct AdminUser(pub MarketplaceUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;
        let user = MarketplaceRepository::find_user(&state.db, &user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !user.is_admin() {
            tracing::debug!(user_id = %user.id, "Admin route refused");
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
pub(crate) fn create_jwt(secret: &str, user_id: &str) -> String {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encode test token")
}
