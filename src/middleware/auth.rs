use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::AppError;
use crate::models::user::{AuthUser, Claims};
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn decode_user(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AppError::AuthError
    })?;

    AuthUser::try_from(token_data.claims).map_err(|_| AppError::AuthError)
}

/// Rejects the request unless it carries a valid bearer token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::AuthError)?;
    let user = decode_user(token, &state.jwt_secret)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Attaches the caller when a valid token is present; anonymous requests pass through.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = bearer_token(request.headers()).and_then(|token| decode_user(token, &state.jwt_secret).ok());
    if let Some(user) = user {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use mongodb::bson::oid::ObjectId;

    fn token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            email: "buyer@example.com".to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_yields_the_user() {
        let id = ObjectId::new();
        let user = decode_user(&token(&id.to_hex(), "s3cret"), "s3cret").unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "buyer@example.com");
    }

    #[test]
    fn wrong_secret_or_bad_subject_is_rejected() {
        let id = ObjectId::new();
        assert!(matches!(decode_user(&token(&id.to_hex(), "a"), "b"), Err(AppError::AuthError)));
        assert!(matches!(decode_user(&token("not-an-id", "a"), "a"), Err(AppError::AuthError)));
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Token abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
