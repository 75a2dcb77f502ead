//! 主应用程序入口
//!
//! 加载配置，组装单房间聊天会话核心，启动 Axum Web API 服务。

use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // 初始化日志，RUST_LOG 优先于配置文件
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = AppState::from_config(&config);
    let coordinator = state.coordinator.clone();

    let reaper = coordinator.spawn_idle_reaper(config.room.reap_interval());
    if reaper.is_some() {
        tracing::info!(
            idle_timeout_secs = ?config.room.session_idle_timeout_secs,
            interval_secs = config.room.reap_interval_secs,
            "空闲会话回收已启用"
        );
    }

    let app = router(state);
    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        history_capacity = config.room.history_capacity,
        typing_timeout_ms = config.room.typing_timeout_ms,
        "聊天室服务器启动在 http://{}",
        address
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    coordinator.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听停止信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到停止信号，正在关闭");
}
