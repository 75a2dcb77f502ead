//! 房间事件
//!
//! 语义上的推送载荷，序列化为 `{"type": ..., "payload": ...}`。

use serde::{Deserialize, Serialize};

use crate::entities::{Message, PresenceEntry, Session};
use crate::value_objects::SessionId;

/// 推送给会话的房间事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum RoomEvent {
    /// 加入时单独发送给加入者的完整历史（旧消息在前）
    HistorySnapshot { messages: Vec<Message> },

    /// 成员变化时广播的在线列表
    ActiveUsers { users: Vec<PresenceEntry> },

    /// 一条聊天消息
    Message { message: Message },

    /// 一条系统通知（加入/离开/清空历史）
    SystemNotice { message: Message },

    /// 输入状态变化
    #[serde(rename_all = "camelCase")]
    TypingState { session_id: SessionId, is_typing: bool },
}

impl RoomEvent {
    /// 从注册表快照构造在线列表事件
    pub fn active_users(sessions: &[Session]) -> Self {
        Self::ActiveUsers {
            users: sessions.iter().map(PresenceEntry::from).collect(),
        }
    }

    /// 事件类型名称，用于日志
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::HistorySnapshot { .. } => "historySnapshot",
            Self::ActiveUsers { .. } => "activeUsers",
            Self::Message { .. } => "message",
            Self::SystemNotice { .. } => "systemNotice",
            Self::TypingState { .. } => "typingState",
        }
    }
}
