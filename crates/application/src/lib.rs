//! 应用层实现。
//!
//! 围绕领域模型提供聊天会话核心：会话注册表、消息历史、房间广播、
//! 输入状态聚合，以及串行化所有变更的在线状态协调器。
//! 消息投递通过 [`Transport`] 抽象，具体传输方式由外层适配器提供。

pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod history;
pub mod local_broadcast;
pub mod presence;
pub mod registry;
pub mod typing;

pub use broadcaster::{RoomBroadcaster, Transport, TransportError};
pub use clock::{Clock, IdGenerator, ManualClock, SystemClock};
pub use error::{ApplicationError, ApplicationResult};
pub use history::MessageHistory;
pub use local_broadcast::{ChannelTransport, SessionMailbox};
pub use presence::{
    JoinOutcome, PresenceCoordinator, PresenceCoordinatorDependencies, RoomSettings,
};
pub use registry::SessionRegistry;
pub use typing::TypingAggregator;
