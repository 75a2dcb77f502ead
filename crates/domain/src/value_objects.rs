use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 会话唯一标识，连接时分配，永不复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<SessionId> for Uuid {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

/// 消息唯一标识，单调递增，可比较先后。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// 经过校验的显示名称。允许重名。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(DomainError::InvalidDisplayName);
        }
        Ok(Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DisplayName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 消息正文内容（已去除首尾空白）。
///
/// 反序列化只校验非空，长度上限由房间配置决定，在 [`MessageBody::parse`] 时检查。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct MessageBody(String);

impl MessageBody {
    /// 校验聊天消息正文，`max_len` 按字符计数
    pub fn parse(value: impl AsRef<str>, max_len: usize) -> Result<Self, DomainError> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(DomainError::EmptyMessage);
        }
        let len = value.chars().count();
        if len > max_len {
            return Err(DomainError::MessageTooLong { len, max: max_len });
        }
        Ok(Self(value.to_owned()))
    }

    /// 系统生成的正文不做长度限制
    pub(crate) fn system(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MessageBody {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value, usize::MAX)
    }
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_is_trimmed() {
        let name = DisplayName::parse("  Alice \n").unwrap();
        assert_eq!(name.as_str(), "Alice");
    }

    #[test]
    fn blank_display_name_is_rejected() {
        assert_eq!(DisplayName::parse("   "), Err(DomainError::InvalidDisplayName));
        assert_eq!(DisplayName::parse(""), Err(DomainError::InvalidDisplayName));
    }

    #[test]
    fn message_body_validation() {
        assert_eq!(MessageBody::parse(" hi ", 10).unwrap().as_str(), "hi");
        assert_eq!(MessageBody::parse("\t ", 10), Err(DomainError::EmptyMessage));

        // 按字符而不是字节计数
        assert!(MessageBody::parse("你好世界", 4).is_ok());
        assert_eq!(
            MessageBody::parse("hello", 4),
            Err(DomainError::MessageTooLong { len: 5, max: 4 })
        );
    }

    #[test]
    fn deserialize_goes_through_validation() {
        let name: DisplayName = serde_json::from_str(r#"" Alice ""#).unwrap();
        assert_eq!(name.as_str(), "Alice");
        assert!(serde_json::from_str::<DisplayName>(r#""   ""#).is_err());

        let body: MessageBody = serde_json::from_str(r#""  hi\n""#).unwrap();
        assert_eq!(body.as_str(), "hi");
        assert!(serde_json::from_str::<MessageBody>(r#""\t""#).is_err());

        // 序列化形式仍是裸字符串
        assert_eq!(serde_json::to_string(&name).unwrap(), r#""Alice""#);
    }

    #[test]
    fn message_ids_are_ordered() {
        assert!(MessageId::new(1) < MessageId::new(2));
        assert_eq!(MessageId::new(7).to_string(), "msg_7");
    }
}
