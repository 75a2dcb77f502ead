//! WebSocket 帧格式
//!
//! 所有帧都是 `{"type": ..., "payload": ...}` 形式的 JSON 文本。
//! 房间事件直接使用 [`domain::RoomEvent`] 的编码，这里只定义客户端命令和
//! 连接层自己的控制帧。

use domain::SessionId;
use serde::{Deserialize, Serialize};

use crate::error::ErrorBody;

/// 客户端发来的命令
///
/// 无参数的命令可以省略 `payload`，例如 `{"type": "leave"}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    Join { display_name: String },
    SendMessage { body: String },
    #[serde(rename_all = "camelCase")]
    SetTyping { is_typing: bool },
    ClearHistory,
    Leave,
    Heartbeat,
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::SendMessage { .. } => "sendMessage",
            Self::SetTyping { .. } => "setTyping",
            Self::ClearHistory => "clearHistory",
            Self::Leave => "leave",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// 连接层控制帧
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerFrame {
    /// 连接建立后第一帧，告知分配到的会话ID
    #[serde(rename_all = "camelCase")]
    Welcome { session_id: SessionId },
    /// 命令被拒绝，只发给发起方
    Error(ErrorBody),
}
