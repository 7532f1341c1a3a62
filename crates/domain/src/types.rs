//! 基础枚举类型
//!
//! 定义外部接口和持久化层共享的枚举。语言和运输商类别在外部接口中
//! 以字符串形式传递，所以这两个类型提供自定义的序列化实现。

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracking_errors::{TrackingError, TrackingResult};

/// 爬取的语言类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LangId {
    /// 中文
    Cn,
    /// 英文
    En,
}

impl LangId {
    pub fn as_str(&self) -> &'static str {
        match self {
            LangId::Cn => "CN",
            LangId::En => "EN",
        }
    }

    /// 持久化层使用的整数值。
    pub fn value(&self) -> i32 {
        match self {
            LangId::Cn => 1,
            LangId::En => 2,
        }
    }

    /// 将字符串解析为LangId。
    /// s 待解析的字符串，会被自动去除首尾空格，然后变为大写。
    pub fn parse(s: &str) -> TrackingResult<Self> {
        match s.trim().to_uppercase().as_str() {
            "CN" => Ok(LangId::Cn),
            "EN" => Ok(LangId::En),
            other => Err(TrackingError::validation_error(format!(
                "unknown lang id: {other}"
            ))),
        }
    }
}

impl Serialize for LangId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LangId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        LangId::parse(&s).map_err(D::Error::custom)
    }
}

/// 优先级。外部接口中以整数(0-2)传递。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// 最高优先级
    Highest,
    /// 高优先级
    High,
    /// 低优先级
    Low,
}

/// 所有优先级，按出队顺序排列。
pub const ALL_PRIORITIES: [Priority; 3] = [Priority::Highest, Priority::High, Priority::Low];

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Highest => "Highest",
            Priority::High => "High",
            Priority::Low => "Low",
        }
    }

    pub fn value(&self) -> i32 {
        match self {
            Priority::Highest => 0,
            Priority::High => 1,
            Priority::Low => 2,
        }
    }

    pub fn from_value(v: i64) -> TrackingResult<Self> {
        match v {
            0 => Ok(Priority::Highest),
            1 => Ok(Priority::High),
            2 => Ok(Priority::Low),
            other => Err(TrackingError::validation_error(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.value())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = i64::deserialize(deserializer)?;
        Priority::from_value(v).map_err(D::Error::custom)
    }
}

/// 运输商类别。外部接口中以字符串形式传递。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarrierType {
    /// 全球邮政。
    Ems,
    /// 全球联合运输商。
    Union,
    /// 国际运输商。
    International,
    /// 中国运输商。
    Cn,
    /// 航空公司。
    Airline,
}

impl CarrierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierType::Ems => "EMS",
            CarrierType::Union => "UNION",
            CarrierType::International => "INTERNATIONAL",
            CarrierType::Cn => "CN",
            CarrierType::Airline => "AIRLINE",
        }
    }

    pub fn value(&self) -> i32 {
        match self {
            CarrierType::Ems => 1,
            CarrierType::Union => 2,
            CarrierType::International => 3,
            CarrierType::Cn => 4,
            CarrierType::Airline => 5,
        }
    }

    pub fn from_value(v: i64) -> TrackingResult<Self> {
        match v {
            1 => Ok(CarrierType::Ems),
            2 => Ok(CarrierType::Union),
            3 => Ok(CarrierType::International),
            4 => Ok(CarrierType::Cn),
            5 => Ok(CarrierType::Airline),
            other => Err(TrackingError::validation_error(format!(
                "unknown carrier type: {other}"
            ))),
        }
    }

    pub fn parse(s: &str) -> TrackingResult<Self> {
        match s.trim().to_uppercase().as_str() {
            "EMS" => Ok(CarrierType::Ems),
            "UNION" => Ok(CarrierType::Union),
            "INTERNATIONAL" => Ok(CarrierType::International),
            "CN" => Ok(CarrierType::Cn),
            "AIRLINE" => Ok(CarrierType::Airline),
            other => Err(TrackingError::validation_error(format!(
                "unknown carrier type: {other}"
            ))),
        }
    }
}

impl Serialize for CarrierType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CarrierType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CarrierType::parse(&s).map_err(D::Error::custom)
    }
}

/// 查询结果的来源。
///
/// 注意整数值在2处有一个空缺，这是和既有数据兼容的约定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrackingResultSrc {
    #[default]
    Unknown,
    Api,
    Crawler,
    Db,
}

impl TrackingResultSrc {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingResultSrc::Unknown => "",
            TrackingResultSrc::Api => "API",
            TrackingResultSrc::Crawler => "Crawler",
            TrackingResultSrc::Db => "DB",
        }
    }

    pub fn value(&self) -> i32 {
        match self {
            TrackingResultSrc::Unknown => -1,
            TrackingResultSrc::Api => 0,
            TrackingResultSrc::Crawler => 1,
            TrackingResultSrc::Db => 3,
        }
    }

    /// 未知的整数值一律映射为`Unknown`。
    pub fn from_value(v: i64) -> Self {
        match v {
            0 => TrackingResultSrc::Api,
            1 => TrackingResultSrc::Crawler,
            3 => TrackingResultSrc::Db,
            _ => TrackingResultSrc::Unknown,
        }
    }
}

/// 查询代理的返回码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentCode {
    /// 成功。
    Success,
    /// 成功。
    Success2,
    /// 单号未查询到。
    NoTracking,
    /// 其它错误。
    #[default]
    Other,
    /// 解析失败。
    ParseFailed,
    /// 超时。
    Timeout,
}

impl AgentCode {
    pub fn value(&self) -> i64 {
        match self {
            AgentCode::Success => 1,
            AgentCode::Success2 => 200,
            AgentCode::NoTracking => 205,
            AgentCode::Other => 206,
            AgentCode::ParseFailed => 207,
            AgentCode::Timeout => 408,
        }
    }

    /// 未定义的返回码一律归入`Other`。
    pub fn from_value(v: i64) -> Self {
        match v {
            1 => AgentCode::Success,
            200 => AgentCode::Success2,
            205 => AgentCode::NoTracking,
            207 => AgentCode::ParseFailed,
            408 => AgentCode::Timeout,
            _ => AgentCode::Other,
        }
    }

    /// 判断返回码是否表示成功。成功或者单号未查询到，都看作成功。
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AgentCode::Success | AgentCode::Success2 | AgentCode::NoTracking
        )
    }
}

/// 查询对象在共享缓存中的执行状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    /// 等待查询代理处理。
    Pending,
    /// 查询代理已受理。
    InFlight,
    /// 查询代理已写回结果。
    Done,
}

impl TicketStatus {
    pub fn value(&self) -> i32 {
        match self {
            TicketStatus::Pending => -1,
            TicketStatus::InFlight => 0,
            TicketStatus::Done => 1,
        }
    }

    pub fn from_value(v: i64) -> Self {
        match v {
            1 => TicketStatus::Done,
            0 => TicketStatus::InFlight,
            _ => TicketStatus::Pending,
        }
    }
}
