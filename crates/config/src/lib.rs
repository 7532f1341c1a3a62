//! 应用配置
//!
//! 配置从TOML文件和`TRACKING__`前缀的环境变量加载，启动时加载一次。
//! 配置解析或校验失败属于致命错误。

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// 默认的监听地址。
pub const DEFAULT_LISTEN: &str = ":8001";
/// 默认的请求超时秒数。
pub const DEFAULT_TIMEOUT_S: u64 = 30;
/// 默认的轮询批量（工作协程数）。
pub const DEFAULT_POLLING_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 提供服务的绑定地址，必须以冒号开头。
    pub listen: String,
    /// 读取和写入的超时（秒）。
    pub timeout_s: u64,
    pub db: DbConfig,
    pub redis: RedisConfig,
    pub agent: AgentConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// 连接数据库的字符串。
    pub dsn: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
}

impl RedisConfig {
    /// 构造redis连接URL。
    pub fn connection_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 轮询时每次处理的批量，也就是工作协程数。
    pub polling_batch_size: usize,
    /// 查询对象在共享缓存中的存活秒数。
    pub ticket_ttl_s: u64,
    /// 查询代理写回结果后的存活秒数。
    pub result_ttl_s: u64,
    /// 数据库记录的有效更新窗口（小时）。
    pub fresh_full: i64,
    /// 空单号记录的有效更新窗口（小时）。
    pub fresh_empty: i64,
    /// 队列全部为空时工作协程的休眠毫秒数。
    pub idle_pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// 客户端ID到客户端密钥的映射。
    #[serde(default)]
    pub clients: HashMap<String, String>,
}

fn default_max_connections() -> u32 {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            timeout_s: DEFAULT_TIMEOUT_S,
            db: DbConfig {
                dsn: String::new(),
                max_connections: default_max_connections(),
            },
            redis: RedisConfig {
                host: "localhost".to_string(),
                port: 6379,
                password: String::new(),
                db: 1,
            },
            agent: AgentConfig {
                polling_batch_size: DEFAULT_POLLING_BATCH_SIZE,
                ticket_ttl_s: 26,
                result_ttl_s: 10,
                fresh_full: 2,
                fresh_empty: 8,
                idle_pause_ms: 400,
            },
            auth: AuthConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从指定文件加载配置。文件不存在时报错；`config_path`为`None`时
    /// 只使用默认值和环境变量。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("listen", DEFAULT_LISTEN)?
            .set_default("timeout_s", DEFAULT_TIMEOUT_S as i64)?
            .set_default("db.dsn", "")?
            .set_default("db.max_connections", 100)?
            .set_default("redis.host", "localhost")?
            .set_default("redis.port", 6379)?
            .set_default("redis.password", "")?
            .set_default("redis.db", 1)?
            .set_default("agent.polling_batch_size", DEFAULT_POLLING_BATCH_SIZE as i64)?
            .set_default("agent.ticket_ttl_s", 26)?
            .set_default("agent.result_ttl_s", 10)?
            .set_default("agent.fresh_full", 2)?
            .set_default("agent.fresh_empty", 8)?
            .set_default("agent.idle_pause_ms", 400)?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {path}"));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        let config: AppConfig = builder
            .add_source(Environment::with_prefix("TRACKING").separator("__"))
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("解析配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 校验配置的合法性。
    pub fn validate(&self) -> Result<()> {
        let listen = self.listen.trim().to_lowercase();
        if listen.is_empty() || listen == ":" {
            return Err(anyhow::anyhow!("监听地址不能为空"));
        }
        if !listen.starts_with(':') && !listen.contains(':') {
            return Err(anyhow::anyhow!(
                "listen address should start with colon(:), do you prefer :{} ?",
                listen
            ));
        }

        let dsn = self.db.dsn.trim();
        if dsn.is_empty() || !dsn.contains('@') || !dsn.contains(':') {
            return Err(anyhow::anyhow!("dsn should contain at(@) and colon(:)"));
        }

        if self.agent.polling_batch_size <= 4 {
            return Err(anyhow::anyhow!(
                "polling batch size should be larger than 4, but {}",
                self.agent.polling_batch_size
            ));
        }
        if self.agent.polling_batch_size > 5000 {
            return Err(anyhow::anyhow!(
                "polling batch size should not be larger than 5000, but {}",
                self.agent.polling_batch_size
            ));
        }

        Ok(())
    }

    /// 将`listen`配置转为可绑定的socket地址。
    pub fn bind_address(&self) -> String {
        let listen = self.listen.trim();
        if let Some(port) = listen.strip_prefix(':') {
            format!("0.0.0.0:{port}")
        } else {
            listen.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.db.dsn = "user:pass@tcp(localhost:3306)/aitrack".to_string();
        config
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.listen, ":8001");
        assert_eq!(config.agent.polling_batch_size, 50);
        assert_eq!(config.agent.fresh_full, 2);
        assert_eq!(config.agent.fresh_empty, 8);
        assert_eq!(config.agent.idle_pause_ms, 400);
    }

    #[test]
    fn test_validate_rejects_empty_dsn() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_pool_size_bounds() {
        let mut config = valid_config();
        config.agent.polling_batch_size = 4;
        assert!(config.validate().is_err());
        config.agent.polling_batch_size = 5001;
        assert!(config.validate().is_err());
        config.agent.polling_batch_size = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_address_expands_bare_port() {
        let mut config = valid_config();
        config.listen = ":8001".to_string();
        assert_eq!(config.bind_address(), "0.0.0.0:8001");
        config.listen = "127.0.0.1:9000".to_string();
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_redis_connection_url() {
        let mut config = valid_config();
        assert_eq!(config.redis.connection_url(), "redis://localhost:6379/1");
        config.redis.password = "pw".to_string();
        assert_eq!(
            config.redis.connection_url(),
            "redis://:pw@localhost:6379/1"
        );
    }
}
