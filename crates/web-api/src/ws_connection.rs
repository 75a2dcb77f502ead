use application::{ApplicationError, ApplicationResult, SessionMailbox};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::SessionId;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant};

use crate::error::ApiError;
use crate::protocol::{ClientCommand, ServerFrame};
use crate::state::AppState;

/// WebSocket 连接
///
/// 把一个 WebSocket 连接接入会话核心：
/// - 连接建立时分配会话ID并挂上信箱
/// - 信箱中的房间事件转发到客户端
/// - 客户端命令交给协调器处理，被拒绝时只给发起方回错误帧
/// - 定时 ping 保活
/// - 连接结束时通知核心，离开与断开走同一个幂等转换
pub struct WebSocketConnection {
    socket: Option<WebSocket>,
    mailbox: Option<SessionMailbox>,
    state: AppState,
    session_id: SessionId,
}

impl WebSocketConnection {
    /// 为新连接分配会话；房间拒绝时回一个错误帧并关闭连接，返回 `None`
    pub async fn new(mut socket: WebSocket, state: AppState) -> Option<Self> {
        let session_id = match state.coordinator.connect().await {
            Ok(session_id) => session_id,
            Err(err) => {
                tracing::warn!(error = %err, "拒绝 WebSocket 连接");
                if let Some(text) = encode(&ServerFrame::Error(ApiError::from(err).into_body())) {
                    let _ = socket.send(WsMessage::Text(text.into())).await;
                }
                let _ = socket.send(WsMessage::Close(None)).await;
                return None;
            }
        };
        let mailbox = state.transport.attach(session_id).await;

        tracing::info!(session_id = %session_id, "WebSocket 连接已建立");

        Some(Self {
            socket: Some(socket),
            mailbox: Some(mailbox),
            state,
            session_id,
        })
    }

    /// 运行连接主循环，直到任意一侧结束
    pub async fn run(mut self) {
        let (Some(socket), Some(mut mailbox)) = (self.socket.take(), self.mailbox.take()) else {
            return;
        };
        let session_id = self.session_id;
        let (mut sender, mut incoming) = socket.split();

        let welcome = match encode(&ServerFrame::Welcome { session_id }) {
            Some(text) => text,
            None => return self.close().await,
        };
        if sender.send(WsMessage::Text(welcome.into())).await.is_err() {
            tracing::warn!(session_id = %session_id, "欢迎帧发送失败");
            return self.close().await;
        }

        // 所有写操作经由命令通道交给发送任务
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let keepalive_period = self.state.keepalive_interval;
        let mut send_task = tokio::spawn(async move {
            let mut keepalive = interval_at(Instant::now() + keepalive_period, keepalive_period);
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break };
                        let frame = match cmd {
                            WsCommand::SendText(text) => WsMessage::Text(text.into()),
                            WsCommand::SendPong(data) => WsMessage::Pong(data),
                        };
                        if sender.send(frame).await.is_err() {
                            tracing::warn!(session_id = %session_id, "WebSocket 写入失败");
                            break;
                        }
                    }
                    event = mailbox.recv() => {
                        let Some(event) = event else {
                            // 核心已移除该会话
                            let _ = sender.send(WsMessage::Close(None)).await;
                            break;
                        };
                        let Some(text) = encode(&event) else { continue };
                        if sender.send(WsMessage::Text(text.into())).await.is_err() {
                            tracing::warn!(
                                session_id = %session_id,
                                event_type = event.event_type(),
                                "房间事件写入失败"
                            );
                            break;
                        }
                    }
                    _ = keepalive.tick() => {
                        if sender.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                            tracing::debug!(session_id = %session_id, "保活 ping 发送失败");
                            break;
                        }
                    }
                }
            }
            tracing::debug!(session_id = %session_id, "WebSocket 发送任务结束");
        });

        // 接收任务只在两帧之间响应停止信号，正在处理的命令总会执行完
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = self.state.clone();
        let mut recv_task = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    message = incoming.next() => message,
                };
                let Some(Ok(message)) = message else { break };
                if Self::handle_incoming(message, &state, session_id, &cmd_tx)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            tracing::debug!(session_id = %session_id, "WebSocket 接收任务结束");
        });

        tokio::select! {
            _ = &mut send_task => {
                let _ = stop_tx.send(true);
                if let Err(err) = recv_task.await {
                    tracing::warn!(session_id = %session_id, error = %err, "WebSocket 接收任务异常退出");
                }
            }
            _ = &mut recv_task => send_task.abort(),
        }

        self.close().await;
    }

    async fn close(&mut self) {
        let left = self
            .state
            .coordinator
            .on_transport_closed(self.session_id)
            .await;
        self.state.transport.detach(self.session_id).await;

        tracing::info!(
            session_id = %self.session_id,
            left,
            "WebSocket 连接已断开"
        );
    }

    /// 处理一帧客户端消息，返回 `Err` 表示连接应当结束
    async fn handle_incoming(
        message: WsMessage,
        state: &AppState,
        session_id: SessionId,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!(session_id = %session_id, "收到关闭帧");
                return Err(());
            }
            WsMessage::Ping(data) => {
                Self::record_activity(state, session_id).await;
                if cmd_tx.send(WsCommand::SendPong(data)).await.is_err() {
                    return Err(());
                }
            }
            WsMessage::Pong(_) => Self::record_activity(state, session_id).await,
            WsMessage::Text(text) => {
                let result = match serde_json::from_str::<ClientCommand>(text.as_str()) {
                    Ok(command) => Self::dispatch(state, session_id, command)
                        .await
                        .map_err(ApiError::from),
                    Err(err) => {
                        tracing::debug!(session_id = %session_id, error = %err, "无法解析客户端命令");
                        Err(ApiError::invalid_command(err.to_string()))
                    }
                };

                if let Err(err) = result {
                    let Some(text) = encode(&ServerFrame::Error(err.into_body())) else {
                        return Ok(());
                    };
                    if cmd_tx.send(WsCommand::SendText(text)).await.is_err() {
                        return Err(());
                    }
                }
            }
            WsMessage::Binary(_) => {
                let err = ApiError::invalid_command("binary frames are not supported");
                if let Some(text) = encode(&ServerFrame::Error(err.into_body())) {
                    if cmd_tx.send(WsCommand::SendText(text)).await.is_err() {
                        return Err(());
                    }
                }
            }
        }
        Ok(())
    }

    /// 保活帧也算作活跃，未加入的会话忽略
    async fn record_activity(state: &AppState, session_id: SessionId) {
        match state.coordinator.heartbeat(session_id).await {
            Ok(()) | Err(ApplicationError::UnknownSession(_)) => {}
            Err(err) => {
                tracing::debug!(session_id = %session_id, error = %err, "保活心跳未记录");
            }
        }
    }

    async fn dispatch(
        state: &AppState,
        session_id: SessionId,
        command: ClientCommand,
    ) -> ApplicationResult<()> {
        tracing::debug!(session_id = %session_id, command = command.name(), "处理客户端命令");

        let coordinator = &state.coordinator;
        match command {
            ClientCommand::Join { display_name } => {
                coordinator.join(session_id, &display_name).await?;
            }
            ClientCommand::SendMessage { body } => {
                coordinator.post_message(session_id, &body).await?;
            }
            ClientCommand::SetTyping { is_typing } => {
                coordinator.set_typing(session_id, is_typing).await?;
            }
            ClientCommand::ClearHistory => {
                coordinator.clear_history(session_id).await?;
            }
            ClientCommand::Leave => {
                coordinator.leave(session_id).await;
            }
            ClientCommand::Heartbeat => {
                coordinator.heartbeat(session_id).await?;
            }
        }
        Ok(())
    }
}

fn encode<T: Serialize>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize websocket payload");
            None
        }
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Bytes),
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        tracing::debug!(session_id = %self.session_id, "WebSocketConnection 被销毁");
    }
}
