use axum::async_trait;
use axum::extract::FromRef;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use clap::ValueEnum;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum AuthMode {
    /// Trusted backend caller; may act for any user.
    ApiKey,
    /// End-user token; may only act for its own subject.
    Jwt,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub api_key: Option<String>,
    pub jwt_secret: Option<String>,
}

impl AuthConfig {
    pub fn api_key(key: &str) -> Self {
        Self {
            mode: AuthMode::ApiKey,
            api_key: Some(key.to_string()),
            jwt_secret: None,
        }
    }

    pub fn jwt(secret: &str) -> Self {
        Self {
            mode: AuthMode::Jwt,
            api_key: None,
            jwt_secret: Some(secret.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUser {
    Service,
    User { subject: String },
}

impl AuthUser {
    /// ユーザー本人（またはサービス）以外の操作を拒否する
    pub fn ensure_acts_for(&self, user_id: &str) -> Result<(), ApiError> {
        match self {
            AuthUser::Service => Ok(()),
            AuthUser::User { subject } if subject == user_id => Ok(()),
            AuthUser::User { .. } => Err(ApiError::Forbidden(
                "token subject does not match requested user".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);

        match config.mode {
            AuthMode::ApiKey => authorize_api_key(parts, &config),
            AuthMode::Jwt => authorize_jwt(parts, &config),
        }
    }
}

fn authorize_api_key(parts: &Parts, config: &AuthConfig) -> Result<AuthUser, ApiError> {
    let expected = config
        .api_key
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("missing BM_API_KEY".into()))?;

    let provided = parts
        .headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing X-API-Key header".into()))?;

    if provided != expected {
        return Err(ApiError::Unauthorized("invalid API key".into()));
    }

    Ok(AuthUser::Service)
}

fn authorize_jwt(parts: &Parts, config: &AuthConfig) -> Result<AuthUser, ApiError> {
    let secret = config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("missing JWT_SECRET".into()))?;

    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("expected Bearer token".into()))?;

    let validation = Validation::new(Algorithm::HS256);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| ApiError::Unauthorized(format!("invalid token: {err}")))?;

    Ok(AuthUser::User {
        subject: data.claims.sub,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    fn parts_with(header: (&str, &str)) -> Parts {
        let (parts, _) = Request::builder()
            .header(header.0, header.1)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn token(secret: &str, sub: &str) -> String {
        let claims = Claims {
            sub: sub.into(),
            exp: 4_102_444_800,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn api_key_must_match() {
        let config = AuthConfig::api_key("k1");

        assert_eq!(
            authorize_api_key(&parts_with(("x-api-key", "k1")), &config).unwrap(),
            AuthUser::Service
        );
        assert!(matches!(
            authorize_api_key(&parts_with(("x-api-key", "nope")), &config),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn jwt_subject_is_extracted_and_scoped() {
        let config = AuthConfig::jwt("secret");
        let bearer = format!("Bearer {}", token("secret", "user-1"));

        let user = authorize_jwt(&parts_with(("authorization", &bearer)), &config).unwrap();

        assert!(user.ensure_acts_for("user-1").is_ok());
        assert!(matches!(
            user.ensure_acts_for("user-2"),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn jwt_signed_with_other_secret_is_rejected() {
        let config = AuthConfig::jwt("secret");
        let bearer = format!("Bearer {}", token("other", "user-1"));

        assert!(matches!(
            authorize_jwt(&parts_with(("authorization", &bearer)), &config),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
