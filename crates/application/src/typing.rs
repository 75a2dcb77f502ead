//! 输入状态聚合器
//!
//! 维护每个会话的输入标志，并在服务端强制超时：客户端消失而没有发送
//! `false` 时，不会留下永远的"正在输入"提示。

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use domain::SessionId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ApplicationResult;
use crate::registry::SessionRegistry;

struct TypingTimer {
    deadline: Instant,
    handle: JoinHandle<()>,
}

pub struct TypingAggregator {
    window: Duration,
    timers: Mutex<HashMap<SessionId, TypingTimer>>,
}

impl TypingAggregator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 更新会话的输入标志，返回标志是否发生了变化。
    ///
    /// 设为 `false` 时同时取消计时器。
    pub(crate) async fn set_flag(
        &self,
        registry: &SessionRegistry,
        session_id: SessionId,
        typing: bool,
    ) -> ApplicationResult<bool> {
        let previous = registry.set_typing(session_id, typing).await?;
        if !typing {
            self.disarm(session_id).await;
        }
        Ok(previous != typing)
    }

    /// （重新）启动计时器；旧计时器被取消，截止时间顺延一个窗口
    pub(crate) async fn arm<F>(&self, session_id: SessionId, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let deadline = Instant::now() + window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expire.await;
        });

        let previous = self
            .timers
            .lock()
            .await
            .insert(session_id, TypingTimer { deadline, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    pub(crate) async fn disarm(&self, session_id: SessionId) {
        if let Some(timer) = self.timers.lock().await.remove(&session_id) {
            timer.handle.abort();
        }
    }

    /// 计时器已到期则移除并返回 `true`。
    ///
    /// 截止时间已被续期或计时器已被取消时返回 `false`，因此同一次到期最多生效一次。
    pub(crate) async fn take_expired(&self, session_id: SessionId, now: Instant) -> bool {
        let mut timers = self.timers.lock().await;
        match timers.get(&session_id) {
            Some(timer) if timer.deadline <= now => {
                timers.remove(&session_id);
                true
            }
            _ => false,
        }
    }

    /// 移除并返回所有已到期的会话
    pub(crate) async fn take_all_expired(&self, now: Instant) -> Vec<SessionId> {
        let mut timers = self.timers.lock().await;
        let expired: Vec<SessionId> = timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .map(|(session_id, _)| *session_id)
            .collect();
        for session_id in &expired {
            if let Some(timer) = timers.remove(session_id) {
                timer.handle.abort();
            }
        }
        expired
    }

    pub(crate) async fn shutdown(&self) {
        for (_, timer) in self.timers.lock().await.drain() {
            timer.handle.abort();
        }
    }

    pub async fn armed_count(&self) -> usize {
        self.timers.lock().await.len()
    }
}
