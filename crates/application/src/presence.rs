//! 在线状态协调器
//!
//! 房间唯一的写入口。每个会话的状态机为 `Connecting -> Joined -> Left`，
//! 所有变更（加入、发言、输入状态、清空历史、离开/断开）及其触发的广播都在
//! 同一把房间级提交锁内完成，因此任何客户端看到的事件顺序都与提交顺序一致，
//! 广播出去的在线列表总是等于当时注册表的内容。
//!
//! 每次提交都在独立任务中运行：调用方的 future 被丢弃（超时、连接任务被中止）
//! 时，已经开始的变更仍会连同它的广播一起完成。

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use domain::{
    DisplayName, Message, MessageBody, PresenceEntry, RoomEvent, Session, SessionId,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{
    broadcaster::{RoomBroadcaster, Transport},
    clock::{Clock, IdGenerator},
    error::{ApplicationError, ApplicationResult},
    history::MessageHistory,
    registry::SessionRegistry,
    typing::TypingAggregator,
};

/// 房间运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSettings {
    pub history_capacity: usize,
    pub typing_timeout: Duration,
    pub push_timeout: Duration,
    pub max_sessions: Option<usize>,
    pub max_message_len: usize,
    pub session_idle_timeout: Option<Duration>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self::from(&config::RoomConfig::default())
    }
}

impl From<&config::RoomConfig> for RoomSettings {
    fn from(config: &config::RoomConfig) -> Self {
        Self {
            history_capacity: config.history_capacity,
            typing_timeout: config.typing_timeout(),
            push_timeout: config.push_timeout(),
            max_sessions: config.max_sessions,
            max_message_len: config.max_message_len,
            session_idle_timeout: config.session_idle_timeout(),
        }
    }
}

pub struct PresenceCoordinatorDependencies {
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub settings: RoomSettings,
}

/// 加入结果：加入者自己的会话记录和完整历史快照
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub session: Session,
    pub history: Vec<Message>,
}

impl JoinOutcome {
    pub fn session_id(&self) -> SessionId {
        self.session.session_id
    }
}

/// 提交锁保护的状态：已连接但尚未加入的会话
#[derive(Default)]
struct CommitState {
    connecting: HashSet<SessionId>,
}

struct RoomInner {
    settings: RoomSettings,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
    registry: SessionRegistry,
    history: MessageHistory,
    broadcaster: RoomBroadcaster,
    typing: TypingAggregator,
    commit: Mutex<CommitState>,
}

/// 单房间聚合根，`Clone` 之后共享同一个房间
#[derive(Clone)]
pub struct PresenceCoordinator {
    inner: Arc<RoomInner>,
}

impl PresenceCoordinator {
    pub fn new(deps: PresenceCoordinatorDependencies) -> Self {
        let settings = deps.settings;
        let inner = RoomInner {
            ids: IdGenerator::new(),
            registry: SessionRegistry::new(settings.max_sessions),
            history: MessageHistory::new(settings.history_capacity),
            broadcaster: RoomBroadcaster::new(deps.transport, settings.push_timeout),
            typing: TypingAggregator::new(settings.typing_timeout),
            clock: deps.clock,
            commit: Mutex::new(CommitState::default()),
            settings,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.inner.settings
    }

    /// 传输层建立连接时调用：分配会话ID，进入 `Connecting` 状态。
    ///
    /// 配置了 `max_sessions` 时，尚未加入的会话数同样受该上限约束。
    pub async fn connect(&self) -> ApplicationResult<SessionId> {
        let mut state = self.inner.commit.lock().await;
        if let Some(max) = self.inner.settings.max_sessions {
            if state.connecting.len() >= max {
                tracing::warn!(pending = state.connecting.len(), "等待加入的连接过多");
                return Err(ApplicationError::RoomFull { max });
            }
        }
        let session_id = self.inner.ids.next_session_id();
        state.connecting.insert(session_id);
        tracing::debug!(session_id = %session_id, "会话已连接，等待加入");
        Ok(session_id)
    }

    /// 加入房间
    ///
    /// 顺序：注册 → 取历史快照 → 追加加入通知 → 向加入者推送快照
    /// → 向其他会话广播加入通知 → 向所有会话（含加入者）广播在线列表。
    pub async fn join(
        &self,
        session_id: SessionId,
        display_name: &str,
    ) -> ApplicationResult<JoinOutcome> {
        let display_name = DisplayName::parse(display_name)?;
        self.commit(move |room| async move { room.join_committed(session_id, display_name).await })
            .await?
    }

    async fn join_committed(
        &self,
        session_id: SessionId,
        display_name: DisplayName,
    ) -> ApplicationResult<JoinOutcome> {
        let inner = &self.inner;
        let mut state = inner.commit.lock().await;

        if !state.connecting.contains(&session_id) {
            if inner.registry.contains(session_id).await {
                return Err(ApplicationError::AlreadyJoined(session_id));
            }
            return Err(ApplicationError::UnknownSession(session_id));
        }

        let now = inner.clock.now();
        let session = inner.registry.register(session_id, display_name, now).await?;
        state.connecting.remove(&session_id);

        // 快照先于加入通知：加入者收到的是加入之前的历史
        let history = inner.history.snapshot().await;
        let notice = Message::joined(inner.ids.next_message_id(), &session.display_name, now);
        inner.history.append(notice.clone()).await;

        let mut unreachable = Vec::new();
        let snapshot_event = RoomEvent::HistorySnapshot {
            messages: history.clone(),
        };
        if inner.broadcaster.send_to(session_id, &snapshot_event).await.is_err() {
            unreachable.push(session_id);
        }

        let recipients = inner.registry.snapshot().await;
        unreachable.extend(
            inner
                .broadcaster
                .broadcast(&recipients, &RoomEvent::SystemNotice { message: notice }, Some(session_id))
                .await,
        );
        unreachable.extend(
            inner
                .broadcaster
                .broadcast(&recipients, &RoomEvent::active_users(&recipients), None)
                .await,
        );

        tracing::info!(
            session_id = %session_id,
            display_name = %session.display_name,
            online = recipients.len(),
            "用户加入聊天室"
        );

        self.settle_unreachable(&mut state, unreachable).await;

        Ok(JoinOutcome { session, history })
    }

    /// 发送聊天消息，广播给包括发送者在内的所有会话
    pub async fn post_message(&self, session_id: SessionId, body: &str) -> ApplicationResult<Message> {
        let body = body.to_owned();
        self.commit(move |room| async move { room.post_message_committed(session_id, &body).await })
            .await?
    }

    async fn post_message_committed(
        &self,
        session_id: SessionId,
        body: &str,
    ) -> ApplicationResult<Message> {
        let inner = &self.inner;
        let mut state = inner.commit.lock().await;

        let session = inner.registry.lookup(session_id).await?;
        let body = MessageBody::parse(body, inner.settings.max_message_len)?;

        let now = inner.clock.now();
        inner.registry.touch(session_id, now).await?;

        let message = Message::chat(
            inner.ids.next_message_id(),
            session_id,
            session.display_name,
            body,
            now,
        );
        let evicted = inner.history.append(message.clone()).await;

        let recipients = inner.registry.snapshot().await;
        let unreachable = inner
            .broadcaster
            .broadcast(
                &recipients,
                &RoomEvent::Message {
                    message: message.clone(),
                },
                None,
            )
            .await;

        tracing::debug!(
            session_id = %session_id,
            message_id = %message.message_id,
            evicted,
            "聊天消息已提交"
        );

        self.settle_unreachable(&mut state, unreachable).await;

        Ok(message)
    }

    /// 设置输入状态；标志变化时广播给除发送者外的所有会话。
    ///
    /// 设为 `true` 会（重新）启动服务端超时，超时后自动等价于设为 `false`。
    pub async fn set_typing(&self, session_id: SessionId, is_typing: bool) -> ApplicationResult<()> {
        self.commit(move |room| async move { room.set_typing_committed(session_id, is_typing).await })
            .await?
    }

    async fn set_typing_committed(
        &self,
        session_id: SessionId,
        is_typing: bool,
    ) -> ApplicationResult<()> {
        let inner = &self.inner;
        let mut state = inner.commit.lock().await;

        inner.registry.touch(session_id, inner.clock.now()).await?;
        let changed = inner
            .typing
            .set_flag(&inner.registry, session_id, is_typing)
            .await?;

        if is_typing {
            let room = Arc::downgrade(&self.inner);
            inner
                .typing
                .arm(session_id, async move {
                    if let Some(coordinator) = PresenceCoordinator::upgrade(&room) {
                        coordinator.expire_typing(session_id).await;
                    }
                })
                .await;
        }

        if changed {
            let unreachable = self.broadcast_typing(session_id, is_typing).await;
            self.settle_unreachable(&mut state, unreachable).await;
        }

        Ok(())
    }

    /// 计时器到期回调。截止时间已被续期或已被清除时什么也不做。
    pub async fn expire_typing(&self, session_id: SessionId) -> bool {
        self.commit(move |room| async move { room.expire_typing_committed(session_id).await })
            .await
            .unwrap_or(false)
    }

    async fn expire_typing_committed(&self, session_id: SessionId) -> bool {
        let mut state = self.inner.commit.lock().await;
        if !self.inner.typing.take_expired(session_id, Instant::now()).await {
            return false;
        }
        self.clear_typing_locked(&mut state, session_id).await
    }

    /// 清除所有已超时的输入状态，返回被清除的数量
    pub async fn sweep_typing(&self) -> usize {
        self.commit(|room| async move { room.sweep_typing_committed().await })
            .await
            .unwrap_or(0)
    }

    async fn sweep_typing_committed(&self) -> usize {
        let mut state = self.inner.commit.lock().await;
        let expired = self.inner.typing.take_all_expired(Instant::now()).await;

        let mut cleared = 0;
        for session_id in expired {
            if self.clear_typing_locked(&mut state, session_id).await {
                cleared += 1;
            }
        }
        cleared
    }

    /// 清空历史并追加一条系统通知，广播给所有会话
    pub async fn clear_history(&self, session_id: SessionId) -> ApplicationResult<Message> {
        self.commit(move |room| async move { room.clear_history_committed(session_id).await })
            .await?
    }

    async fn clear_history_committed(&self, session_id: SessionId) -> ApplicationResult<Message> {
        let inner = &self.inner;
        let mut state = inner.commit.lock().await;

        let session = inner.registry.lookup(session_id).await?;
        let now = inner.clock.now();
        inner.registry.touch(session_id, now).await?;

        inner.history.clear().await;
        let notice = Message::history_cleared(inner.ids.next_message_id(), &session.display_name, now);
        inner.history.append(notice.clone()).await;

        let recipients = inner.registry.snapshot().await;
        let unreachable = inner
            .broadcaster
            .broadcast(
                &recipients,
                &RoomEvent::SystemNotice {
                    message: notice.clone(),
                },
                None,
            )
            .await;

        tracing::info!(
            session_id = %session_id,
            display_name = %session.display_name,
            "历史消息已清空"
        );

        self.settle_unreachable(&mut state, unreachable).await;

        Ok(notice)
    }

    /// 心跳：只刷新最后活跃时间
    pub async fn heartbeat(&self, session_id: SessionId) -> ApplicationResult<()> {
        let _state = self.inner.commit.lock().await;
        self.inner
            .registry
            .touch(session_id, self.inner.clock.now())
            .await
    }

    /// 主动离开。已离开或从未加入的会话静默忽略，返回是否发生了状态转换。
    pub async fn leave(&self, session_id: SessionId) -> bool {
        self.commit(move |room| async move {
            let mut state = room.inner.commit.lock().await;
            let left = room.depart_and_settle(&mut state, session_id).await;
            if left {
                tracing::info!(session_id = %session_id, "用户主动离开");
            }
            left
        })
        .await
        .unwrap_or(false)
    }

    /// 传输层通知连接已关闭，与 [`leave`](Self::leave) 走同一个转换
    pub async fn on_transport_closed(&self, session_id: SessionId) -> bool {
        self.commit(move |room| async move {
            let mut state = room.inner.commit.lock().await;
            let left = room.depart_and_settle(&mut state, session_id).await;
            if left {
                tracing::info!(session_id = %session_id, "连接关闭，会话已移除");
            } else {
                tracing::debug!(session_id = %session_id, "连接关闭，会话此前已移除");
            }
            left
        })
        .await
        .unwrap_or(false)
    }

    /// 回收超过空闲时限的会话，返回被回收的会话ID
    pub async fn reap_idle(&self) -> Vec<SessionId> {
        self.commit(|room| async move { room.reap_idle_committed().await })
            .await
            .unwrap_or_default()
    }

    async fn reap_idle_committed(&self) -> Vec<SessionId> {
        let Some(timeout) = self.inner.settings.session_idle_timeout else {
            return Vec::new();
        };
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return Vec::new();
        };
        let mut state = self.inner.commit.lock().await;
        let Some(cutoff) = self.inner.clock.now().checked_sub_signed(timeout) else {
            return Vec::new();
        };

        let mut reaped = Vec::new();
        for session_id in self.inner.registry.idle_since(cutoff).await {
            if self.depart_and_settle(&mut state, session_id).await {
                tracing::info!(session_id = %session_id, "空闲会话已回收");
                reaped.push(session_id);
            }
        }
        reaped
    }

    /// 周期性执行空闲回收；未配置空闲时限时返回 `None`。
    ///
    /// 任务只持有弱引用，房间被释放后自动结束。
    pub fn spawn_idle_reaper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.inner.settings.session_idle_timeout?;
        let room = Arc::downgrade(&self.inner);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(coordinator) = PresenceCoordinator::upgrade(&room) else {
                    break;
                };
                let reaped = coordinator.reap_idle().await;
                if !reaped.is_empty() {
                    tracing::debug!(count = reaped.len(), "空闲回收完成");
                }
            }
        }))
    }

    /// 测试与停机用的拆除钩子：取消所有计时器，丢弃所有会话，不发送广播
    pub async fn shutdown(&self) {
        let _ = self
            .commit(|room| async move {
                let inner = &room.inner;
                let mut state = inner.commit.lock().await;
                inner.typing.shutdown().await;

                let connecting: Vec<SessionId> = state.connecting.drain().collect();
                let sessions = inner.registry.drain().await;
                for session_id in connecting
                    .into_iter()
                    .chain(sessions.iter().map(|session| session.session_id))
                {
                    inner.broadcaster.disconnect(session_id).await;
                }

                tracing::info!(sessions = sessions.len(), "聊天室已关闭");
            })
            .await;
    }

    // ---- 只读查询，不经过提交锁 ----

    pub async fn active_users(&self) -> Vec<PresenceEntry> {
        self.inner
            .registry
            .snapshot()
            .await
            .iter()
            .map(PresenceEntry::from)
            .collect()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.inner.registry.snapshot().await
    }

    pub async fn session(&self, session_id: SessionId) -> ApplicationResult<Session> {
        self.inner.registry.lookup(session_id).await
    }

    pub async fn history(&self) -> Vec<Message> {
        self.inner.history.snapshot().await
    }

    pub async fn recent_history(&self, limit: usize) -> Vec<Message> {
        self.inner.history.recent(limit).await
    }

    fn upgrade(room: &Weak<RoomInner>) -> Option<Self> {
        room.upgrade().map(|inner| Self { inner })
    }

    /// 在独立任务中运行一次提交，调用方被取消不会中断它
    async fn commit<T, F, Fut>(&self, op: F) -> ApplicationResult<T>
    where
        F: FnOnce(PresenceCoordinator) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(op(self.clone())).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => {
                tracing::warn!(error = %err, "提交任务未完成");
                Err(ApplicationError::Interrupted)
            }
        }
    }

    // ---- 以下方法都要求调用方已持有提交锁 ----

    async fn broadcast_typing(&self, session_id: SessionId, is_typing: bool) -> Vec<SessionId> {
        let recipients = self.inner.registry.snapshot().await;
        self.inner
            .broadcaster
            .broadcast(
                &recipients,
                &RoomEvent::TypingState {
                    session_id,
                    is_typing,
                },
                Some(session_id),
            )
            .await
    }

    async fn clear_typing_locked(&self, state: &mut CommitState, session_id: SessionId) -> bool {
        match self
            .inner
            .typing
            .set_flag(&self.inner.registry, session_id, false)
            .await
        {
            Ok(true) => {
                tracing::debug!(session_id = %session_id, "输入状态超时，自动清除");
                let unreachable = self.broadcast_typing(session_id, false).await;
                self.settle_unreachable(state, unreachable).await;
                true
            }
            Ok(false) | Err(_) => false,
        }
    }

    async fn depart_and_settle(&self, state: &mut CommitState, session_id: SessionId) -> bool {
        match self.depart_locked(state, session_id).await {
            Some(unreachable) => {
                self.settle_unreachable(state, unreachable).await;
                true
            }
            None => false,
        }
    }

    /// `Joined -> Left` 转换。会话不在注册表中时返回 `None` 且没有任何副作用，
    /// 否则返回广播过程中发现的不可达会话。
    async fn depart_locked(
        &self,
        state: &mut CommitState,
        session_id: SessionId,
    ) -> Option<Vec<SessionId>> {
        let inner = &self.inner;

        if state.connecting.remove(&session_id) {
            inner.broadcaster.disconnect(session_id).await;
            return None;
        }

        let session = inner.registry.unregister(session_id).await?;
        inner.typing.disarm(session_id).await;
        inner.broadcaster.disconnect(session_id).await;

        let now = inner.clock.now();
        let notice = Message::left(inner.ids.next_message_id(), &session.display_name, now);
        inner.history.append(notice.clone()).await;

        let remaining = inner.registry.snapshot().await;
        let mut unreachable = Vec::new();
        if session.typing {
            unreachable.extend(
                inner
                    .broadcaster
                    .broadcast(
                        &remaining,
                        &RoomEvent::TypingState {
                            session_id,
                            is_typing: false,
                        },
                        None,
                    )
                    .await,
            );
        }
        unreachable.extend(
            inner
                .broadcaster
                .broadcast(&remaining, &RoomEvent::SystemNotice { message: notice }, None)
                .await,
        );
        unreachable.extend(
            inner
                .broadcaster
                .broadcast(&remaining, &RoomEvent::active_users(&remaining), None)
                .await,
        );

        tracing::info!(
            session_id = %session_id,
            display_name = %session.display_name,
            online = remaining.len(),
            "用户离开聊天室"
        );

        Some(unreachable)
    }

    /// 把不可达会话按断开处理，直到不再产生新的不可达会话。
    /// 每个会话至多转换一次，重复出现的ID被忽略。
    async fn settle_unreachable(&self, state: &mut CommitState, unreachable: Vec<SessionId>) {
        let mut pending: VecDeque<SessionId> = unreachable.into();
        while let Some(session_id) = pending.pop_front() {
            if let Some(more) = self.depart_locked(state, session_id).await {
                tracing::warn!(session_id = %session_id, "会话不可达，按断开处理");
                pending.extend(more);
            }
        }
    }
}
