//! 统一的响应包装。

use serde::Serialize;

/// 表示成功的查询。
pub const STATUS_SUCCESS: &str = "S";
/// 表示出现错误的查询。
pub const STATUS_ERROR: &str = "E";

#[derive(Debug, Clone, Serialize)]
pub struct CommonResponse<T: Serialize> {
    /// 查询状态代码。该字段为"E"时`data`字段不可用。
    pub status: &'static str,
    /// 查询状态代码对应的文本。
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> CommonResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl CommonResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            status: STATUS_ERROR,
            message,
            data: None,
        }
    }
}
