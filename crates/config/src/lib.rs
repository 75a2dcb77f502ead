//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 房间（历史容量、输入超时、推送超时、会话上限）
//! - 服务设置
//! - 日志
//!
//! 加载顺序：内置默认值 → `chatroom.toml`（可用 `CHAT_CONFIG` 指定路径）
//! → `CHAT_` 前缀的环境变量（嵌套字段用 `__` 分隔，例如
//! `CHAT_ROOM__HISTORY_CAPACITY=200`）。

use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "chatroom.toml";

/// 保活 ping 间隔上限（秒）
pub const MAX_KEEPALIVE_INTERVAL_SECS: u64 = 3_600;

/// 输入状态超时上限（毫秒）
pub const MAX_TYPING_TIMEOUT_MS: u64 = 3_600_000;

/// 全局应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 房间配置
    #[serde(default)]
    pub room: RoomConfig,
    /// 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 房间配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// 历史消息容量
    pub history_capacity: usize,
    /// 服务端输入状态超时（毫秒）
    pub typing_timeout_ms: u64,
    /// 单个会话推送超时（毫秒）
    pub push_timeout_ms: u64,
    /// 最大在线会话数，不设置则不限制
    pub max_sessions: Option<usize>,
    /// 单条消息最大字符数
    pub max_message_len: usize,
    /// 会话空闲多久后被回收（秒），不设置则不回收
    pub session_idle_timeout_secs: Option<u64>,
    /// 空闲回收检查间隔（秒）
    pub reap_interval_secs: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            typing_timeout_ms: 5_000,
            push_timeout_ms: 1_000,
            max_sessions: None,
            max_message_len: 2_000,
            session_idle_timeout_secs: None,
            reap_interval_secs: 30,
        }
    }
}

impl RoomConfig {
    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// WebSocket 保活 ping 间隔（秒）
    pub keepalive_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            keepalive_interval_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 未设置 `RUST_LOG` 时使用的过滤级别
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// 组装配置来源
    pub fn figment() -> Figment {
        let path = std::env::var("CHAT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHAT_").split("__"))
    }

    /// 加载并验证配置
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let room = &self.room;

        if room.history_capacity == 0 {
            return Err(ConfigError::InvalidRoomConfig(
                "history_capacity must be greater than 0".to_string(),
            ));
        }

        if room.typing_timeout_ms == 0 || room.typing_timeout_ms > MAX_TYPING_TIMEOUT_MS {
            return Err(ConfigError::InvalidRoomConfig(format!(
                "typing_timeout_ms must be between 1 and {MAX_TYPING_TIMEOUT_MS}"
            )));
        }

        if room.push_timeout_ms == 0 {
            return Err(ConfigError::InvalidRoomConfig(
                "push_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if room.max_message_len == 0 {
            return Err(ConfigError::InvalidRoomConfig(
                "max_message_len must be greater than 0".to_string(),
            ));
        }

        if room.max_sessions == Some(0) {
            return Err(ConfigError::InvalidRoomConfig(
                "max_sessions must be greater than 0 when set".to_string(),
            ));
        }

        if room.session_idle_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidRoomConfig(
                "session_idle_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        if room.reap_interval_secs == 0 {
            return Err(ConfigError::InvalidRoomConfig(
                "reap_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "host cannot be empty".to_string(),
            ));
        }

        let keepalive = self.server.keepalive_interval_secs;
        if keepalive == 0 || keepalive > MAX_KEEPALIVE_INTERVAL_SECS {
            return Err(ConfigError::InvalidServerConfig(format!(
                "keepalive_interval_secs must be between 1 and {MAX_KEEPALIVE_INTERVAL_SECS}"
            )));
        }

        if self.log.level.trim().is_empty() {
            return Err(ConfigError::InvalidLogConfig(
                "level cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid room configuration: {0}")]
    InvalidRoomConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid log configuration: {0}")]
    InvalidLogConfig(String),
}
