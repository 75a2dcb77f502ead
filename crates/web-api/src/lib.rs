//! Web API 层。
//!
//! 提供 Axum 路由：HTTP 只读查询，以及把 WebSocket 连接接入会话核心的适配器。

mod error;
pub mod protocol;
mod routes;
mod state;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use protocol::{ClientCommand, ServerFrame};
pub use routes::router;
pub use state::AppState;
