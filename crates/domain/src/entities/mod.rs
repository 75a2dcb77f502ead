//! 领域实体定义
//!
//! 包含会话核心的两个实体：会话与消息。

pub mod message;
pub mod session;

// 重新导出核心实体
pub use message::{Message, MessageKind};
pub use session::{PresenceEntry, Session};
