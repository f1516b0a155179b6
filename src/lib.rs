//! Table Config - 基于数据库表的自动重载配置
//!
//! 从关系型数据库的一张 `name / value / type` 配置表读取键值配置，支持：
//! - 构造时同步加载，之后按固定间隔整体重载
//! - 查询只读内存快照，不访问数据库
//! - 字符串、整数、浮点数、布尔值查询及默认值
//! - 数据源健康检测
//! - 快照变更通知

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod reload;
pub mod reloading;
pub mod resolver;
pub mod scheduler;
pub mod snapshot;
pub mod source;

// 重新导出主要类型
pub use config::{DatabaseSettings, Settings};
pub use error::{HealthError, ReloadError, ResolveError, SourceError, TableConfigError};
pub use health::{HealthChecker, HealthReport, HealthStatus};
pub use reload::{ReloadEngine, ReloadStats, SnapshotDiff, SnapshotUpdate};
pub use reloading::ReloadingConfig;
pub use resolver::Resolver;
pub use scheduler::{Scheduler, TokioScheduler};
pub use snapshot::{ConfigEntry, Snapshot};
pub use source::{ConfigRow, DataSource, MemoryDataSource, SqlDataSource};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
