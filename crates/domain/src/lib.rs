//! 聊天会话核心领域模型
//!
//! 包含会话、消息、房间事件等核心类型，以及输入校验规则。

pub mod entities;
pub mod errors;
pub mod events;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use value_objects::*;
