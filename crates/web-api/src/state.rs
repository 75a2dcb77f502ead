use std::sync::Arc;
use std::time::Duration;

use application::{
    ChannelTransport, PresenceCoordinator, PresenceCoordinatorDependencies, RoomSettings,
    SystemClock,
};
use config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: PresenceCoordinator,
    pub transport: ChannelTransport,
    pub keepalive_interval: Duration,
}

impl AppState {
    pub fn new(
        coordinator: PresenceCoordinator,
        transport: ChannelTransport,
        keepalive_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            transport,
            keepalive_interval,
        }
    }

    /// 按配置组装房间：进程内信箱传输 + 系统时钟
    pub fn from_config(config: &AppConfig) -> Self {
        let transport = ChannelTransport::new();
        let coordinator = PresenceCoordinator::new(PresenceCoordinatorDependencies {
            transport: Arc::new(transport.clone()),
            clock: Arc::new(SystemClock),
            settings: RoomSettings::from(&config.room),
        });

        Self::new(coordinator, transport, config.server.keepalive_interval())
    }
}
