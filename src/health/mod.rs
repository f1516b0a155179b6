//! 健康检测模块
//!
//! 检测配置数据源的连接和探测查询

pub mod checker;
pub mod result;

// 重新导出主要类型
pub use checker::{HealthChecker, SourceHealthChecker, PROBE_EXPECTED, PROBE_SQL};
pub use result::{HealthReport, HealthStatus};
