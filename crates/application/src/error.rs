use domain::{DomainError, SessionId};
use thiserror::Error;

/// 应用层错误
///
/// 所有变体都是调用方错误：操作被拒绝且不产生任何状态变更或广播。
/// 投递失败（`SessionUnreachable`）在广播内部就地恢复，不会出现在这里。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    #[error("session already joined: {0}")]
    AlreadyJoined(SessionId),
    #[error("room is full: at most {max} sessions")]
    RoomFull { max: usize },
    #[error("commit interrupted by runtime shutdown")]
    Interrupted,
}

impl ApplicationError {
    /// 稳定的错误码，供传输层返回给客户端
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(err) => err.code(),
            ApplicationError::UnknownSession(_) => "UNKNOWN_SESSION",
            ApplicationError::AlreadyJoined(_) => "ALREADY_JOINED",
            ApplicationError::RoomFull { .. } => "ROOM_FULL",
            ApplicationError::Interrupted => "INTERRUPTED",
        }
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
