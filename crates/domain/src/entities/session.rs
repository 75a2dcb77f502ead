//! 会话实体定义
//!
//! 每个已加入房间的参与者对应一个会话，由会话注册表独占持有。

use serde::{Deserialize, Serialize};

use crate::value_objects::{DisplayName, SessionId, Timestamp};

/// 会话实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// 会话ID
    pub session_id: SessionId,
    /// 显示名称，加入后不可变
    pub display_name: DisplayName,
    /// 加入时间
    pub connected_at: Timestamp,
    /// 最后活跃时间
    pub last_activity_at: Timestamp,
    /// 是否正在输入，仅由输入状态聚合器修改
    pub typing: bool,
    /// 加入顺序，在线列表按此排序
    pub join_order: u64,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        display_name: DisplayName,
        join_order: u64,
        now: Timestamp,
    ) -> Self {
        Self {
            session_id,
            display_name,
            connected_at: now,
            last_activity_at: now,
            typing: false,
            join_order,
        }
    }

    /// 记录一次活动
    pub fn touch(&mut self, now: Timestamp) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }

    /// 截止时间之前没有任何活动
    pub fn is_idle_since(&self, cutoff: Timestamp) -> bool {
        self.last_activity_at < cutoff
    }

    pub fn presence(&self) -> PresenceEntry {
        PresenceEntry::from(self)
    }
}

/// 在线列表中的一项，随 `activeUsers` 事件广播
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub session_id: SessionId,
    pub display_name: DisplayName,
    pub typing: bool,
}

impl From<&Session> for PresenceEntry {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id,
            display_name: session.display_name.clone(),
            typing: session.typing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session() -> Session {
        Session::new(
            SessionId::from(Uuid::new_v4()),
            DisplayName::parse("Alice").unwrap(),
            1,
            Utc::now(),
        )
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut session = session();
        let joined = session.last_activity_at;

        session.touch(joined - Duration::seconds(5));
        assert_eq!(session.last_activity_at, joined);

        session.touch(joined + Duration::seconds(5));
        assert_eq!(session.last_activity_at, joined + Duration::seconds(5));
        assert_eq!(session.connected_at, joined);
    }

    #[test]
    fn test_idle_check() {
        let session = session();
        let at = session.last_activity_at;

        assert!(session.is_idle_since(at + Duration::seconds(1)));
        assert!(!session.is_idle_since(at));
    }
}
