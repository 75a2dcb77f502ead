//! 领域模型错误定义
//!
//! 这些错误都属于调用方错误：在任何状态变更之前被拒绝，只返回给发起方。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 显示名称为空（去除首尾空白后）
    #[error("显示名称不能为空")]
    InvalidDisplayName,

    /// 消息正文为空（去除首尾空白后）
    #[error("消息内容为空")]
    EmptyMessage,

    /// 消息正文过长
    #[error("消息内容过长: {len} > {max}")]
    MessageTooLong { len: usize, max: usize },
}

impl DomainError {
    /// 错误码，供传输层返回给客户端
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDisplayName => "INVALID_DISPLAY_NAME",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
