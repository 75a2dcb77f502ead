//! 消息实体定义
//!
//! 消息一经创建不可变，只会被追加到历史或从历史头部淘汰。

use serde::{Deserialize, Serialize};

use crate::value_objects::{DisplayName, MessageBody, MessageId, SessionId, Timestamp};

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// 用户发送的聊天消息
    Chat,
    /// 加入、离开、清空历史等系统通知
    System,
}

/// 消息实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: MessageId,
    pub kind: MessageKind,
    /// 系统消息没有作者会话
    pub author_session_id: Option<SessionId>,
    /// 聊天消息为作者名称，系统消息为通知涉及的用户名称
    pub author_display_name: DisplayName,
    pub body: MessageBody,
    pub created_at: Timestamp,
}

impl Message {
    /// 创建聊天消息
    pub fn chat(
        message_id: MessageId,
        author_session_id: SessionId,
        author_display_name: DisplayName,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Self {
        Self {
            message_id,
            kind: MessageKind::Chat,
            author_session_id: Some(author_session_id),
            author_display_name,
            body,
            created_at,
        }
    }

    fn system(
        message_id: MessageId,
        subject: DisplayName,
        text: String,
        created_at: Timestamp,
    ) -> Self {
        Self {
            message_id,
            kind: MessageKind::System,
            author_session_id: None,
            author_display_name: subject,
            body: MessageBody::system(text),
            created_at,
        }
    }

    /// "X joined the chat"
    pub fn joined(message_id: MessageId, who: &DisplayName, created_at: Timestamp) -> Self {
        Self::system(
            message_id,
            who.clone(),
            format!("{who} joined the chat"),
            created_at,
        )
    }

    /// "X left the chat"
    pub fn left(message_id: MessageId, who: &DisplayName, created_at: Timestamp) -> Self {
        Self::system(
            message_id,
            who.clone(),
            format!("{who} left the chat"),
            created_at,
        )
    }

    /// "History cleared by X"
    pub fn history_cleared(message_id: MessageId, by: &DisplayName, created_at: Timestamp) -> Self {
        Self::system(
            message_id,
            by.clone(),
            format!("History cleared by {by}"),
            created_at,
        )
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }
}
