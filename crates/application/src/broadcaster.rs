use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{RoomEvent, Session, SessionId};
use futures_util::future::join_all;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("session unreachable: {0}")]
    SessionUnreachable(SessionId),
}

/// 外部传输协作者
///
/// 会话核心不拥有连接，只通过它把事件推送给某个已连接会话。
/// 推送是尽力而为的：连接已经消失时返回 `SessionUnreachable`。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn push(&self, session_id: SessionId, event: &RoomEvent) -> Result<(), TransportError>;

    /// 核心已移除该会话（离开、不可达或空闲回收），传输层可以关闭对应连接
    async fn disconnect(&self, _session_id: SessionId) {}
}

/// 房间广播器
///
/// 对每个接收者的推送互不影响：单个会话失败或超时不会中断对其他会话的投递，
/// 失败的会话ID会返回给调用方，由协调器按断开处理。
pub struct RoomBroadcaster {
    transport: Arc<dyn Transport>,
    push_timeout: Duration,
}

impl RoomBroadcaster {
    pub fn new(transport: Arc<dyn Transport>, push_timeout: Duration) -> Self {
        Self {
            transport,
            push_timeout,
        }
    }

    /// 推送给单个会话，耗时受 `push_timeout` 限制
    pub async fn send_to(&self, session_id: SessionId, event: &RoomEvent) -> Result<(), TransportError> {
        match tokio::time::timeout(self.push_timeout, self.transport.push(session_id, event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                tracing::warn!(
                    session_id = %session_id,
                    event_type = event.event_type(),
                    error = %err,
                    "事件推送失败"
                );
                Err(err)
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %session_id,
                    event_type = event.event_type(),
                    timeout_ms = self.push_timeout.as_millis() as u64,
                    "事件推送超时"
                );
                Err(TransportError::SessionUnreachable(session_id))
            }
        }
    }

    /// 推送给快照中除 `exclude` 以外的所有会话，返回不可达的会话ID
    pub async fn broadcast(
        &self,
        recipients: &[Session],
        event: &RoomEvent,
        exclude: Option<SessionId>,
    ) -> Vec<SessionId> {
        let deliveries = recipients
            .iter()
            .map(|session| session.session_id)
            .filter(|session_id| Some(*session_id) != exclude)
            .map(|session_id| async move { (session_id, self.send_to(session_id, event).await) });

        let unreachable: Vec<SessionId> = join_all(deliveries)
            .await
            .into_iter()
            .filter_map(|(session_id, result)| result.err().map(|_| session_id))
            .collect();

        tracing::debug!(
            event_type = event.event_type(),
            recipients = recipients.len(),
            failed = unreachable.len(),
            "房间广播完成"
        );

        unreachable
    }

    /// 通知传输层关闭会话连接
    pub async fn disconnect(&self, session_id: SessionId) {
        self.transport.disconnect(session_id).await;
    }
}
