//! 健康检测结果数据结构
//!
//! 定义健康检测的结果类型和状态枚举

use crate::error::HealthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 健康状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 数据源正常
    Up,
    /// 数据源异常
    Down,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Up => write!(f, "正常"),
            HealthStatus::Down => write!(f, "异常"),
        }
    }
}

impl HealthStatus {
    /// 判断状态是否为健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Up)
    }
}

/// 健康检测报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// 健康状态
    pub status: HealthStatus,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
    /// 检测耗时
    #[serde(with = "duration_serde")]
    pub response_time: Duration,
    /// 错误信息（如果有）
    pub error_message: Option<String>,
}

impl HealthReport {
    /// 由检测结果创建报告
    ///
    /// # 参数
    /// * `result` - 检测结果
    /// * `response_time` - 检测耗时
    pub fn from_result(result: &Result<(), HealthError>, response_time: Duration) -> Self {
        let (status, error_message) = match result {
            Ok(()) => (HealthStatus::Up, None),
            Err(e) => (HealthStatus::Down, Some(e.to_string())),
        };

        Self {
            status,
            checked_at: Utc::now(),
            response_time,
            error_message,
        }
    }

    /// 获取检测耗时（毫秒）
    pub fn response_time_ms(&self) -> u64 {
        self.response_time.as_millis() as u64
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
