use thiserror::Error;

/// 传输层错误
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("连接失败: {0}")]
    Connect(String),

    /// 服务端在握手阶段拒绝，例如凭证无效
    #[error("握手被拒绝: HTTP {status}")]
    Rejected { status: u16 },
}

impl TransportError {
    /// 凭证类错误重试没有意义
    pub fn is_rejected(&self) -> bool {
        matches!(self, TransportError::Rejected { status } if *status == 401 || *status == 403)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 新的 connect 或 disconnect 抢先结束了本次尝试
    #[error("连接尝试已被取消")]
    Superseded,
}
