//! 领域事件定义
//!
//! 会话核心推送给客户端的房间事件。

pub mod room_event;

// 重新导出事件类型
pub use room_event::*;
