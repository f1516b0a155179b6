//! 数据源健康检测器实现
//!
//! 先检测连接，再执行探测查询并校验返回值

use crate::error::HealthError;
use crate::health::result::HealthReport;
use crate::source::DataSource;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// 探测查询语句
pub const PROBE_SQL: &str = "SELECT 1";

/// 探测查询期望的返回值
pub const PROBE_EXPECTED: i64 = 1;

/// 健康检测器trait，定义检测接口
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// 执行健康检测
    ///
    /// # 返回
    /// * `Result<(), HealthError>` - 检测结果，失败时不做重试
    async fn check(&self) -> Result<(), HealthError>;

    /// 执行健康检测并生成报告
    async fn report(&self) -> HealthReport {
        let start_time = Instant::now();
        let result = self.check().await;
        HealthReport::from_result(&result, start_time.elapsed())
    }
}

/// 数据源健康检测器
pub struct SourceHealthChecker {
    /// 数据源
    source: Arc<dyn DataSource>,
    /// 探测查询
    probe_sql: String,
    /// 期望值
    expected: i64,
}

impl SourceHealthChecker {
    /// 创建使用默认探测查询的检测器
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self::with_probe(source, PROBE_SQL, PROBE_EXPECTED)
    }

    /// 创建使用自定义探测查询的检测器
    ///
    /// # 参数
    /// * `source` - 数据源
    /// * `probe_sql` - 返回单个整数的查询
    /// * `expected` - 期望的返回值
    pub fn with_probe(source: Arc<dyn DataSource>, probe_sql: &str, expected: i64) -> Self {
        Self {
            source,
            probe_sql: probe_sql.to_string(),
            expected,
        }
    }
}

#[async_trait]
impl HealthChecker for SourceHealthChecker {
    async fn check(&self) -> Result<(), HealthError> {
        self.source.ping().await.map_err(|e| {
            warn!("数据源连接检测失败: {}", e);
            HealthError::Unreachable(e.to_string())
        })?;

        let actual = self
            .source
            .query_scalar(&self.probe_sql)
            .await
            .map_err(|e| {
                warn!("探测查询失败: {}", e);
                HealthError::QueryFailed(e.to_string())
            })?;

        if actual != self.expected {
            warn!("探测值不匹配: 期望 {}, 实际 {}", self.expected, actual);
            return Err(HealthError::EchoMismatch {
                expected: self.expected,
                actual,
            });
        }

        debug!("数据源健康检测通过");
        Ok(())
    }
}
