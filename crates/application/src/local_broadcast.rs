// 进程内的会话传输实现
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{RoomEvent, SessionId};
use tokio::sync::{mpsc, RwLock};

use crate::broadcaster::{Transport, TransportError};

/// 每个会话一个无界 mpsc 信箱的传输实现
///
/// 外层连接（WebSocket、SSE 等）在 `connect` 之后调用 [`ChannelTransport::attach`]
/// 取得信箱并负责把事件写到真正的连接上；信箱被丢弃后推送返回
/// `SessionUnreachable`。
#[derive(Clone, Default)]
pub struct ChannelTransport {
    mailboxes: Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<RoomEvent>>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为会话创建信箱，已存在的旧信箱会被替换
    pub async fn attach(&self, session_id: SessionId) -> SessionMailbox {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.mailboxes.write().await.insert(session_id, sender);
        SessionMailbox {
            session_id,
            receiver,
        }
    }

    pub async fn detach(&self, session_id: SessionId) {
        self.mailboxes.write().await.remove(&session_id);
    }

    pub async fn mailbox_count(&self) -> usize {
        self.mailboxes.read().await.len()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn push(&self, session_id: SessionId, event: &RoomEvent) -> Result<(), TransportError> {
        let mailboxes = self.mailboxes.read().await;
        let sender = mailboxes
            .get(&session_id)
            .ok_or(TransportError::SessionUnreachable(session_id))?;
        sender
            .send(event.clone())
            .map_err(|_| TransportError::SessionUnreachable(session_id))
    }

    async fn disconnect(&self, session_id: SessionId) {
        self.detach(session_id).await;
    }
}

/// 单个会话的事件信箱
pub struct SessionMailbox {
    session_id: SessionId,
    receiver: mpsc::UnboundedReceiver<RoomEvent>,
}

impl SessionMailbox {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// 等待下一个事件；核心移除该会话后返回 `None`
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        self.receiver.recv().await
    }

    /// 取出当前已到达的所有事件
    pub fn drain(&mut self) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}
