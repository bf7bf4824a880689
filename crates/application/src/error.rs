use domain::{DomainError, ServerEvent};
use thiserror::Error;

use crate::bus::BusError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("transient io failure: {0}")]
    TransientIo(String),
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

impl ApplicationError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// 是否属于可容忍的基础设施故障
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_) | Self::Bus(_))
    }

    /// 发送给触发者的错误事件。认证失败发生在连接建立之前，没有可以推送的连接。
    pub fn to_client_event(&self) -> Option<ServerEvent> {
        let event = match self {
            Self::Authentication(_) => return None,
            Self::NotFound(message) | Self::Forbidden(message) => ServerEvent::error(message),
            Self::Validation(message) => ServerEvent::error(message),
            Self::RateLimited { retry_after_secs } => ServerEvent::Error {
                message: format!(
                    "Rate limit exceeded. Please wait {retry_after_secs} seconds."
                ),
                retry_after: Some(*retry_after_secs),
            },
            Self::TransientIo(_) | Self::Bus(_) => ServerEvent::error("Internal server error"),
        };
        Some(event)
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound { resource_type, .. } => {
                ApplicationError::NotFound(format!("{resource_type} not found"))
            }
            DomainError::Validation { field, message } => {
                ApplicationError::Validation(format!("{field}: {message}"))
            }
            DomainError::Storage(message) => ApplicationError::TransientIo(message),
        }
    }
}
