//! 统一配置中心
//!
//! 加载顺序：内置默认值 -> 可选配置文件（`APP_CONFIG_FILE`）-> 环境变量（`APP_*`，`__` 表示嵌套）。
//! 例如 `APP_RATE_LIMIT__MESSAGE__MAX_EVENTS=30`。
//!
//! 提供：
//! - 服务监听设置
//! - 扇出总线后端与 Redis 连接
//! - JWT认证
//! - 限流窗口

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub redis: RedisConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[serde(default)]
    #[validate(nested)]
    pub bus: BusConfig,
    #[serde(default)]
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    /// 启动时写入演示用户和房间
    #[serde(default)]
    pub seed_demo: bool,
}

/// Redis配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RedisConfig {
    #[validate(url)]
    pub url: String,
    /// 所有频道名的公共前缀
    pub channel_prefix: String,
    /// 订阅连接断开后的首次重连间隔
    #[validate(range(min = 1))]
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
            channel_prefix: "chat:".into(),
            reconnect_interval_ms: 1000,
            max_reconnect_attempts: 10,
        }
    }
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    /// 至少 256 位
    #[validate(length(min = 32))]
    pub secret: String,
    #[validate(range(min = 1))]
    pub expiration_hours: i64,
}

/// 扇出总线后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// 进程内广播，仅适用于单实例部署
    #[default]
    Memory,
    /// Redis Pub/Sub，多实例共享
    Redis,
}

/// 扇出总线配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BusConfig {
    pub backend: BusBackend,
    /// 进程内广播通道容量
    #[validate(range(min = 1))]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::Memory,
            capacity: 1024,
        }
    }
}

/// 单个事件类别的固定窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct WindowConfig {
    #[validate(range(min = 1))]
    pub max_events: u32,
    #[validate(range(min = 1))]
    pub window_secs: u64,
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    #[validate(nested)]
    pub message: WindowConfig,
    #[validate(nested)]
    pub typing: WindowConfig,
    /// 后台清理过期窗口的周期
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,
    /// 窗口过期后保留的宽限期
    pub grace_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            message: WindowConfig {
                max_events: 20,
                window_secs: 60,
            },
            typing: WindowConfig {
                max_events: 60,
                window_secs: 60,
            },
            sweep_interval_secs: 300,
            grace_secs: 60,
        }
    }
}

impl Default for AppConfig {
    /// 开发环境默认值，JWT 密钥必须在部署时覆盖
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                seed_demo: false,
            },
            redis: RedisConfig::default(),
            jwt: JwtConfig {
                secret: "dev-secret-key-not-for-production-use-minimum-32-chars".into(),
                expiration_hours: 24,
            },
            bus: BusConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    /// 按优先级合并各配置源
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed("APP_").split("__"))
    }

    /// 加载并校验配置
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let cfg: AppConfig = figment.extract().map_err(Box::new)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 在默认值之上叠加一段 TOML
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(AppConfig::default()))
                .merge(Toml::string(s)),
        )
    }

    /// 用于日志输出的脱敏表示
    pub fn sanitize(&self) -> String {
        let mut redacted = self.clone();
        redacted.jwt.secret = "[REDACTED]".into();
        redacted.redis.url = redact_url_credentials(&redacted.redis.url);
        format!("{:?}", redacted)
    }
}

fn redact_url_credentials(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}[REDACTED]{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
