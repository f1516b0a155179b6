//! 自动重载配置
//!
//! 组合数据源、重载引擎、查询器和健康检测器，构造时同步加载一次，
//! 之后可交给调度器周期重载

use crate::config::Settings;
use crate::error::{HealthError, ReloadError, ResolveError, Result};
use crate::health::{HealthChecker, HealthReport, SourceHealthChecker};
use crate::reload::{ReloadEngine, ReloadStats, SnapshotUpdate};
use crate::resolver::Resolver;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::snapshot::Snapshot;
use crate::source::{DataSource, SqlDataSource};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// 重载任务在调度器中的名称
pub const RELOAD_TASK_NAME: &str = "table-config-reload";

/// 默认重载间隔
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// 自动重载配置
pub struct ReloadingConfig {
    /// 重载引擎
    engine: Arc<ReloadEngine>,
    /// 查询器
    resolver: Resolver,
    /// 健康检测器
    health_checker: Arc<dyn HealthChecker>,
    /// 重载间隔
    reload_interval: Duration,
    /// 正在驱动重载的调度器
    scheduler: Mutex<Option<Arc<dyn Scheduler>>>,
}

impl ReloadingConfig {
    /// 根据配置连接数据库并完成首次加载
    ///
    /// # 参数
    /// * `settings` - 配置
    ///
    /// # 返回
    /// * `Result<Self>` - 连接失败或首次加载失败时返回错误
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let source = SqlDataSource::connect(&settings.database).await?;

        Self::with_source(
            Arc::new(source),
            &settings.database.table,
            Duration::from_secs(settings.reload.interval_seconds),
        )
        .await
    }

    /// 使用已有数据源创建并完成首次加载
    ///
    /// # 参数
    /// * `source` - 数据源
    /// * `table` - 配置表名
    /// * `reload_interval` - 自动重载间隔
    pub async fn with_source(
        source: Arc<dyn DataSource>,
        table: &str,
        reload_interval: Duration,
    ) -> Result<Self> {
        let engine = Arc::new(ReloadEngine::new(Arc::clone(&source), table).await?);
        let resolver = Resolver::new(engine.store(), table);
        let health_checker = Arc::new(SourceHealthChecker::new(source));

        Ok(Self {
            engine,
            resolver,
            health_checker,
            reload_interval,
            scheduler: Mutex::new(None),
        })
    }

    /// 替换健康检测器
    pub fn with_health_checker(mut self, health_checker: Arc<dyn HealthChecker>) -> Self {
        self.health_checker = health_checker;
        self
    }

    /// 立即重新加载配置表
    pub async fn reload(&self) -> std::result::Result<u64, ReloadError> {
        self.engine.reload().await
    }

    /// 在调度器上注册周期重载任务
    ///
    /// 重复调用会替换之前注册的任务
    pub async fn start_auto_reload(&self, scheduler: Arc<dyn Scheduler>) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let task: ScheduledTask = Arc::new(move || {
            let engine = Arc::clone(&engine);
            async move {
                // 失败已在引擎中记录，继续使用旧快照
                if let Err(e) = engine.reload().await {
                    debug!("周期重载失败: {}", e);
                }
            }
            .boxed()
        });

        let mut current = self.scheduler.lock().await;
        if let Some(previous) = current.take() {
            previous.cancel(RELOAD_TASK_NAME).await;
        }

        scheduler
            .schedule(RELOAD_TASK_NAME, self.reload_interval, task)
            .await?;
        *current = Some(scheduler);

        info!(
            "已启用配置表 {} 的自动重载，间隔 {:?}",
            self.engine.table_name(),
            self.reload_interval
        );
        Ok(())
    }

    /// 停止周期重载，返回之前是否已启用
    pub async fn stop_auto_reload(&self) -> bool {
        let mut current = self.scheduler.lock().await;
        match current.take() {
            Some(scheduler) => {
                scheduler.cancel(RELOAD_TASK_NAME).await;
                info!("已停止配置表 {} 的自动重载", self.engine.table_name());
                true
            }
            None => false,
        }
    }

    /// 获取查询器
    pub fn resolver(&self) -> Resolver {
        self.resolver.clone()
    }

    /// 获取当前快照
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.resolver.snapshot()
    }

    /// 精确查询
    pub fn resolve(&self, key: &str) -> std::result::Result<String, ResolveError> {
        self.resolver.resolve(key)
    }

    /// 查询配置值，不存在时返回默认值
    pub fn resolve_or_default(&self, key: &str, default: &str) -> String {
        self.resolver.resolve_or_default(key, default)
    }

    /// 查询 i32 配置值
    pub fn resolve_int(&self, key: &str, default: i32) -> std::result::Result<i32, ResolveError> {
        self.resolver.resolve_int(key, default)
    }

    /// 查询 i64 配置值
    pub fn resolve_int64(
        &self,
        key: &str,
        default: i64,
    ) -> std::result::Result<i64, ResolveError> {
        self.resolver.resolve_int64(key, default)
    }

    /// 查询 f64 配置值
    pub fn resolve_float(
        &self,
        key: &str,
        default: f64,
    ) -> std::result::Result<f64, ResolveError> {
        self.resolver.resolve_float(key, default)
    }

    /// 查询布尔配置值
    pub fn resolve_bool(
        &self,
        key: &str,
        default: bool,
    ) -> std::result::Result<bool, ResolveError> {
        self.resolver.resolve_bool(key, default)
    }

    /// 检测数据源健康状态
    pub async fn check(&self) -> std::result::Result<(), HealthError> {
        self.health_checker.check().await
    }

    /// 检测数据源健康状态并生成报告
    pub async fn health_report(&self) -> HealthReport {
        self.health_checker.report().await
    }

    /// 订阅快照变更通知
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.engine.subscribe()
    }

    /// 获取重载统计信息
    pub async fn stats(&self) -> ReloadStats {
        self.engine.stats().await
    }

    /// 最后一次成功加载的时间
    pub fn last_reloaded(&self) -> DateTime<Utc> {
        self.engine.last_reloaded()
    }

    /// 配置表名
    pub fn table_name(&self) -> &str {
        self.engine.table_name()
    }

    /// 自动重载间隔
    pub fn reload_interval(&self) -> Duration {
        self.reload_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TokioScheduler;
    use crate::source::MemoryDataSource;

    async fn create_test_config(interval: Duration) -> (Arc<MemoryDataSource>, ReloadingConfig) {
        let source = Arc::new(MemoryDataSource::new("config"));
        let config = ReloadingConfig::with_source(source.clone(), "config", interval)
            .await
            .unwrap();
        (source, config)
    }

    #[tokio::test]
    async fn test_auto_reload_picks_up_changes() {
        let (source, config) = create_test_config(Duration::from_millis(20)).await;
        let scheduler = Arc::new(TokioScheduler::new());

        config.start_auto_reload(scheduler.clone()).await.unwrap();
        source.upsert("hello", "beforebigbang", "string").await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(config.resolve("hello").unwrap(), "beforebigbang");
        assert!(source.query_count() >= 2);

        assert!(config.stop_auto_reload().await);
        assert!(!config.stop_auto_reload().await);
        assert_eq!(scheduler.get_status().await.running_tasks, 0);
    }

    #[tokio::test]
    async fn test_resolvers_do_not_touch_source() {
        let (source, config) = create_test_config(DEFAULT_RELOAD_INTERVAL).await;

        for _ in 0..10 {
            let _ = config.resolve_or_default("hello", "x");
            let _ = config.resolve_int("n", 0);
        }
        assert_eq!(source.query_count(), 1);
    }

    #[tokio::test]
    async fn test_check_uses_source() {
        let (source, config) = create_test_config(DEFAULT_RELOAD_INTERVAL).await;

        assert!(config.check().await.is_ok());
        source.set_available(false);
        assert!(matches!(
            config.check().await,
            Err(HealthError::Unreachable(_))
        ));
        assert!(!config.health_report().await.status.is_healthy());
    }

    #[tokio::test]
    async fn test_metadata() {
        let (_, config) = create_test_config(Duration::from_secs(30)).await;

        assert_eq!(config.table_name(), "config");
        assert_eq!(config.reload_interval(), Duration::from_secs(30));
        assert_eq!(config.snapshot().version(), 1);
        assert_eq!(config.last_reloaded(), config.snapshot().loaded_at());
    }
}
