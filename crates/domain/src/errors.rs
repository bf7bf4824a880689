//! 领域模型错误定义
//!
//! 外部协作者（文档存储、房间目录）返回的错误也统一使用这里的类型。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 资源不存在错误
    #[error("{resource_type} not found: {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    /// 验证错误
    #[error("validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    /// 存储层故障（连接失败、写入失败等）
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    /// 创建资源不存在错误
    pub fn not_found(resource_type: impl Into<String>, resource_id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
        }
    }

    /// 创建验证错误
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建存储错误
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

/// 领域层结果类型
pub type DomainResult<T> = Result<T, DomainError>;
