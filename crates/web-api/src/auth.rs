//! JWT 认证模块
//!
//! 提供 JWT token 生成、验证，以及握手凭证的提取。

use application::{ApplicationError, CredentialVerifier};
use async_trait::async_trait;
use axum::http::HeaderMap;
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            user_id: user_id.as_uuid(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| {
                ApiError::internal_server_error(format!("Token generation failed: {}", err))
            })
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| ApiError::unauthorized(format!("Invalid token: {}", err)))
    }

    /// 从 headers 中提取和验证 token
    pub fn extract_user_from_headers(&self, headers: &HeaderMap) -> Result<UserId, ApiError> {
        let token = bearer_token(headers)
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;
        let claims = self.verify_token(token)?;
        Ok(UserId::from(claims.user_id))
    }
}

#[async_trait]
impl CredentialVerifier for JwtService {
    async fn verify(&self, credential: &str) -> Result<UserId, ApplicationError> {
        decode::<Claims>(credential, &self.decoding_key, &Validation::default())
            .map(|token_data| UserId::from(token_data.claims.user_id))
            .map_err(|err| ApplicationError::authentication(format!("invalid token: {err}")))
    }
}

/// `Authorization: Bearer <token>` 中的 token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}
