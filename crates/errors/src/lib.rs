use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("缓存错误: {0}")]
    Cache(String),
    #[error("队列错误: {0}")]
    Queue(String),
    #[error("查询队列已满")]
    Overloaded,
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("鉴权失败: {0}")]
    Auth(String),
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("时钟回拨，拒绝生成流水号: 落后{behind_ms}毫秒")]
    ClockBackwards { behind_ms: u64 },
    #[error("查询对象丢失: {key}")]
    TicketMissing { key: String },
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type TrackingResult<T> = Result<T, TrackingError>;

impl TrackingError {
    pub fn cache_error<S: Into<String>>(msg: S) -> Self {
        Self::Cache(msg.into())
    }
    pub fn queue_error<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn auth_error<S: Into<String>>(msg: S) -> Self {
        Self::Auth(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TrackingError::Internal(_) | TrackingError::Configuration(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackingError::DatabaseOperation(_)
                | TrackingError::Cache(_)
                | TrackingError::Queue(_)
                | TrackingError::Network(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            TrackingError::Auth(_) => "鉴权失败，请检查客户端凭证",
            TrackingError::Validation(_) => "输入数据验证失败",
            TrackingError::Overloaded => "查询队列已满，请稍后重试",
            TrackingError::ClockBackwards { .. } => "系统时钟异常，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for TrackingError {
    fn from(err: serde_json::Error) -> Self {
        TrackingError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for TrackingError {
    fn from(err: anyhow::Error) -> Self {
        TrackingError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(TrackingError::Configuration("bad".into()).is_fatal());
        assert!(!TrackingError::Cache("down".into()).is_fatal());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TrackingError::Queue("down".into()).is_retryable());
        assert!(!TrackingError::Validation("empty".into()).is_retryable());
    }

    #[test]
    fn test_display_contains_context() {
        let err = TrackingError::ClockBackwards { behind_ms: 15 };
        assert!(err.to_string().contains("15"));
    }
}
