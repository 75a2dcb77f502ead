use std::net::SocketAddr;
use std::time::Duration;

use config::AppConfig;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn(config: AppConfig) -> Self {
        let state = AppState::from_config(&config);
        let app = router(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// 建立 WebSocket 连接并读取欢迎帧，返回分配到的会话ID
    pub async fn connect(&self) -> (WsClient, String) {
        let url = format!("ws://{}/api/v1/ws", self.addr);
        let (mut ws, _) = connect_async(url).await.expect("connect websocket");
        let welcome = next_frame(&mut ws).await;
        assert_eq!(welcome["type"], "welcome");
        let session_id = welcome["payload"]["sessionId"]
            .as_str()
            .expect("session id")
            .to_string();
        (ws, session_id)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub async fn send_command(ws: &mut WsClient, command: Value) {
    ws.send(TungsteniteMessage::text(command.to_string()))
        .await
        .expect("send command");
}

/// 读取下一条文本帧，跳过 ping/pong
pub async fn next_frame(ws: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame timeout")
            .expect("stream ended")
            .expect("websocket error");
        match message {
            TungsteniteMessage::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("json frame")
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// 读取指定类型的下一帧
pub async fn expect_frame(ws: &mut WsClient, frame_type: &str) -> Value {
    let frame = next_frame(ws).await;
    assert_eq!(frame["type"], frame_type, "unexpected frame: {frame}");
    frame["payload"].clone()
}

pub fn display_names(users: &Value) -> Vec<String> {
    users["users"]
        .as_array()
        .expect("users array")
        .iter()
        .map(|user| user["displayName"].as_str().unwrap_or_default().to_string())
        .collect()
}
