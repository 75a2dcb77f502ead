use std::collections::HashMap;

use domain::{DisplayName, Session, SessionId, Timestamp};
use tokio::sync::RwLock;

use crate::error::{ApplicationError, ApplicationResult};

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Session>,
    next_join_order: u64,
}

/// 会话注册表
///
/// 当前在线会话的权威记录。写操作只由在线状态协调器在提交锁内调用，
/// 读操作（快照、查询）可以并发执行。
pub struct SessionRegistry {
    max_sessions: Option<usize>,
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    pub fn new(max_sessions: Option<usize>) -> Self {
        Self {
            max_sessions,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// 注册新会话。显示名称允许重复，只有会话ID唯一。
    pub(crate) async fn register(
        &self,
        session_id: SessionId,
        display_name: DisplayName,
        now: Timestamp,
    ) -> ApplicationResult<Session> {
        let mut state = self.state.write().await;

        if state.sessions.contains_key(&session_id) {
            return Err(ApplicationError::AlreadyJoined(session_id));
        }
        if let Some(max) = self.max_sessions {
            if state.sessions.len() >= max {
                return Err(ApplicationError::RoomFull { max });
            }
        }

        state.next_join_order += 1;
        let session = Session::new(session_id, display_name, state.next_join_order, now);
        state.sessions.insert(session_id, session.clone());
        Ok(session)
    }

    pub async fn lookup(&self, session_id: SessionId) -> ApplicationResult<Session> {
        self.state
            .read()
            .await
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(ApplicationError::UnknownSession(session_id))
    }

    pub async fn contains(&self, session_id: SessionId) -> bool {
        self.state.read().await.sessions.contains_key(&session_id)
    }

    pub(crate) async fn touch(&self, session_id: SessionId, now: Timestamp) -> ApplicationResult<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(ApplicationError::UnknownSession(session_id))?;
        session.touch(now);
        Ok(())
    }

    /// 幂等：第二次调用返回 `None` 且没有副作用
    pub(crate) async fn unregister(&self, session_id: SessionId) -> Option<Session> {
        self.state.write().await.sessions.remove(&session_id)
    }

    /// 修改输入标志，返回修改前的值。仅供输入状态聚合器使用。
    pub(crate) async fn set_typing(
        &self,
        session_id: SessionId,
        typing: bool,
    ) -> ApplicationResult<bool> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(ApplicationError::UnknownSession(session_id))?;
        Ok(std::mem::replace(&mut session.typing, typing))
    }

    /// 按加入顺序排列的时间点快照
    pub async fn snapshot(&self) -> Vec<Session> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state.sessions.values().cloned().collect();
        sessions.sort_by_key(|session| session.join_order);
        sessions
    }

    /// 截止时间之后没有任何活动的会话
    pub async fn idle_since(&self, cutoff: Timestamp) -> Vec<SessionId> {
        let state = self.state.read().await;
        let mut idle: Vec<&Session> = state
            .sessions
            .values()
            .filter(|session| session.is_idle_since(cutoff))
            .collect();
        idle.sort_by_key(|session| session.join_order);
        idle.into_iter().map(|session| session.session_id).collect()
    }

    pub(crate) async fn drain(&self) -> Vec<Session> {
        let mut state = self.state.write().await;
        let mut sessions: Vec<Session> = state.sessions.drain().map(|(_, s)| s).collect();
        sessions.sort_by_key(|session| session.join_order);
        sessions
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn new_id() -> SessionId {
        SessionId::from(Uuid::new_v4())
    }

    fn name(value: &str) -> DisplayName {
        DisplayName::parse(value).unwrap()
    }

    #[tokio::test]
    async fn test_register_allows_duplicate_display_names() {
        let registry = SessionRegistry::new(None);
        let now = Utc::now();

        let first = registry.register(new_id(), name("Alice"), now).await.unwrap();
        let second = registry.register(new_id(), name("Alice"), now).await.unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_register_same_id_twice_fails() {
        let registry = SessionRegistry::new(None);
        let id = new_id();

        registry.register(id, name("Alice"), Utc::now()).await.unwrap();
        let result = registry.register(id, name("Alice"), Utc::now()).await;
        assert!(matches!(result, Err(ApplicationError::AlreadyJoined(got)) if got == id));
    }

    #[tokio::test]
    async fn test_register_respects_limit() {
        let registry = SessionRegistry::new(Some(1));
        registry.register(new_id(), name("Alice"), Utc::now()).await.unwrap();

        let result = registry.register(new_id(), name("Bob"), Utc::now()).await;
        assert!(matches!(result, Err(ApplicationError::RoomFull { max: 1 })));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = SessionRegistry::new(None);
        let id = new_id();
        registry.register(id, name("Alice"), Utc::now()).await.unwrap();

        assert!(registry.unregister(id).await.is_some());
        assert!(registry.unregister(id).await.is_none());
        assert!(registry.is_empty().await);
        assert!(matches!(
            registry.lookup(id).await,
            Err(ApplicationError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_is_in_join_order() {
        let registry = SessionRegistry::new(None);
        let now = Utc::now();
        let names = ["Alice", "Bob", "Carol", "Dave"];

        for display_name in names {
            registry.register(new_id(), name(display_name), now).await.unwrap();
        }

        let snapshot = registry.snapshot().await;
        let got: Vec<&str> = snapshot.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(got, names);
    }

    #[tokio::test]
    async fn test_touch_and_idle() {
        let registry = SessionRegistry::new(None);
        let start = Utc::now();
        let alice = new_id();
        let bob = new_id();
        registry.register(alice, name("Alice"), start).await.unwrap();
        registry.register(bob, name("Bob"), start).await.unwrap();

        registry.touch(bob, start + Duration::seconds(60)).await.unwrap();

        let idle = registry.idle_since(start + Duration::seconds(30)).await;
        assert_eq!(idle, vec![alice]);

        assert!(matches!(
            registry.touch(new_id(), start).await,
            Err(ApplicationError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn test_set_typing_returns_previous() {
        let registry = SessionRegistry::new(None);
        let id = new_id();
        registry.register(id, name("Alice"), Utc::now()).await.unwrap();

        assert!(!registry.set_typing(id, true).await.unwrap());
        assert!(registry.set_typing(id, true).await.unwrap());
        assert!(registry.lookup(id).await.unwrap().typing);
        assert!(registry.set_typing(id, false).await.unwrap());
    }
}
