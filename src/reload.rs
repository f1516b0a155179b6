//! 配置重载模块
//!
//! 从数据源读取整张配置表，构建新快照后原子替换，并广播变更通知

use crate::config::is_valid_table_name;
use crate::error::{ReloadError, Result, SettingsError};
use crate::snapshot::{ConfigEntry, Snapshot, SnapshotStore};
use crate::source::{ConfigRow, DataSource};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// 快照差异类型
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotDiff {
    /// 配置项添加
    EntryAdded { key: String, entry: ConfigEntry },
    /// 配置项移除
    EntryRemoved { key: String },
    /// 配置项修改
    EntryModified {
        key: String,
        old: ConfigEntry,
        new: ConfigEntry,
    },
}

impl SnapshotDiff {
    /// 变更涉及的配置项名称
    pub fn key(&self) -> &str {
        match self {
            SnapshotDiff::EntryAdded { key, .. }
            | SnapshotDiff::EntryRemoved { key }
            | SnapshotDiff::EntryModified { key, .. } => key,
        }
    }
}

/// 快照变更通知
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    /// 新快照版本号
    pub version: u64,
    /// 差异列表
    pub diffs: Vec<SnapshotDiff>,
    /// 变更时间
    pub timestamp: DateTime<Utc>,
}

/// 重载统计信息
#[derive(Debug, Clone, Default)]
pub struct ReloadStats {
    /// 成功次数
    pub successful_reloads: u64,
    /// 失败次数
    pub failed_reloads: u64,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 最后一次错误
    pub last_error: Option<ReloadError>,
    /// 最后一次尝试时间
    pub last_attempt: Option<DateTime<Utc>>,
}

/// 重载引擎
pub struct ReloadEngine {
    /// 数据源
    source: Arc<dyn DataSource>,
    /// 配置表名
    table: String,
    /// 快照存储
    store: Arc<SnapshotStore>,
    /// 下一个快照版本号
    next_version: AtomicU64,
    /// 串行化版本分配与快照替换
    install_lock: Mutex<()>,
    /// 变更通知发送器
    update_sender: broadcast::Sender<SnapshotUpdate>,
    /// 统计信息
    stats: RwLock<ReloadStats>,
}

impl ReloadEngine {
    /// 创建重载引擎并同步执行首次加载
    ///
    /// # 参数
    /// * `source` - 数据源
    /// * `table` - 配置表名
    ///
    /// # 返回
    /// * `Result<Self>` - 表名非法或首次加载失败时返回错误
    pub async fn new(source: Arc<dyn DataSource>, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(SettingsError::ValidationError(format!("无效的配置表名: {table}")).into());
        }

        let started = Instant::now();
        let rows = source.query_all(&table).await.map_err(ReloadError::from)?;
        let snapshot = Self::build_snapshot(&table, rows, 1);
        info!(
            "首次加载配置表 {} 完成，配置项 {} 个，耗时 {:?}",
            table,
            snapshot.len(),
            started.elapsed()
        );

        let (update_sender, _) = broadcast::channel(32);
        let stats = ReloadStats {
            successful_reloads: 1,
            last_attempt: Some(snapshot.loaded_at()),
            ..Default::default()
        };

        Ok(Self {
            source,
            table,
            store: Arc::new(SnapshotStore::new(snapshot)),
            next_version: AtomicU64::new(2),
            install_lock: Mutex::new(()),
            update_sender,
            stats: RwLock::new(stats),
        })
    }

    /// 由整张表的数据构建新快照
    fn build_snapshot(table: &str, rows: Vec<ConfigRow>, version: u64) -> Snapshot {
        let (snapshot, duplicates) = Snapshot::from_rows(rows, version, Utc::now());

        for key in duplicates {
            warn!("配置表 {} 中存在重复的配置项: {}", table, key);
        }

        snapshot
    }

    /// 重新加载配置表
    ///
    /// 失败时保留原快照和加载时间不变
    ///
    /// # 返回
    /// * `Result<u64, ReloadError>` - 新快照的版本号
    pub async fn reload(&self) -> std::result::Result<u64, ReloadError> {
        let started = Instant::now();

        let rows = match self.source.query_all(&self.table).await {
            Ok(rows) => rows,
            Err(e) => {
                let e = ReloadError::from(e);
                warn!("重载配置表 {} 失败，继续使用旧快照: {}", self.table, e);
                self.record_failure(&e).await;
                return Err(e);
            }
        };

        // 版本号在查询完成后分配，并与替换一起持锁完成，
        // 重叠的重载按安装顺序得到递增的版本号
        let _install = self.install_lock.lock().await;
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(Self::build_snapshot(&self.table, rows, version));

        let previous = self.store.swap(Arc::clone(&snapshot));
        self.record_success(snapshot.loaded_at()).await;

        let diffs = Self::calculate_diff(&previous, &snapshot);
        info!(
            "重载配置表 {} 完成，版本: {}, 配置项: {}, 变更: {}, 耗时 {:?}",
            self.table,
            version,
            snapshot.len(),
            diffs.len(),
            started.elapsed()
        );

        if !diffs.is_empty() {
            for diff in &diffs {
                debug!("配置项变更: {:?}", diff);
            }

            let update = SnapshotUpdate {
                version,
                diffs,
                timestamp: snapshot.loaded_at(),
            };
            // 没有订阅者时发送会失败，可以忽略
            if self.update_sender.send(update).is_err() {
                debug!("没有快照变更订阅者");
            }
        }

        Ok(version)
    }

    /// 计算两个快照之间的差异
    pub fn calculate_diff(old: &Snapshot, new: &Snapshot) -> Vec<SnapshotDiff> {
        let mut diffs = Vec::new();
        let old_entries: &HashMap<String, ConfigEntry> = old.entries();

        for (key, new_entry) in new.entries() {
            match old_entries.get(key) {
                Some(old_entry) if old_entry != new_entry => {
                    if old_entry.declared_type != new_entry.declared_type {
                        warn!(
                            "配置项 {} 的类型由 {} 变为 {}",
                            key, old_entry.declared_type, new_entry.declared_type
                        );
                    }
                    diffs.push(SnapshotDiff::EntryModified {
                        key: key.clone(),
                        old: old_entry.clone(),
                        new: new_entry.clone(),
                    });
                }
                Some(_) => {}
                None => diffs.push(SnapshotDiff::EntryAdded {
                    key: key.clone(),
                    entry: new_entry.clone(),
                }),
            }
        }

        for key in old_entries.keys() {
            if !new.contains(key) {
                diffs.push(SnapshotDiff::EntryRemoved { key: key.clone() });
            }
        }

        diffs.sort_by(|a, b| a.key().cmp(b.key()));
        diffs
    }

    async fn record_success(&self, at: DateTime<Utc>) {
        let mut stats = self.stats.write().await;
        stats.successful_reloads += 1;
        stats.consecutive_failures = 0;
        stats.last_error = None;
        stats.last_attempt = Some(at);
    }

    async fn record_failure(&self, error: &ReloadError) {
        let mut stats = self.stats.write().await;
        stats.failed_reloads += 1;
        stats.consecutive_failures += 1;
        stats.last_error = Some(error.clone());
        stats.last_attempt = Some(Utc::now());
    }

    /// 订阅快照变更通知
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.update_sender.subscribe()
    }

    /// 获取快照存储
    pub fn store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.store)
    }

    /// 获取数据源
    pub fn source(&self) -> Arc<dyn DataSource> {
        Arc::clone(&self.source)
    }

    /// 配置表名
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// 最后一次成功加载的时间
    pub fn last_reloaded(&self) -> DateTime<Utc> {
        self.store.load().loaded_at()
    }

    /// 获取统计信息
    pub async fn stats(&self) -> ReloadStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableConfigError;
    use crate::error::SourceError;
    use crate::source::{ConfigRow, MemoryDataSource};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// 第一次重载（第二次查询）变慢的数据源
    struct SlowFirstReload {
        inner: MemoryDataSource,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataSource for SlowFirstReload {
        async fn query_all(&self, table: &str) -> std::result::Result<Vec<ConfigRow>, SourceError> {
            let rows = self.inner.query_all(table).await;
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            rows
        }

        async fn ping(&self) -> std::result::Result<(), SourceError> {
            self.inner.ping().await
        }

        async fn query_scalar(&self, sql: &str) -> std::result::Result<i64, SourceError> {
            self.inner.query_scalar(sql).await
        }
    }

    async fn create_test_engine() -> (Arc<MemoryDataSource>, ReloadEngine) {
        let source = Arc::new(MemoryDataSource::with_rows(
            "config",
            vec![ConfigRow::new("hello", "beforebigbang", "string")],
        ));
        let engine = ReloadEngine::new(source.clone(), "config").await.unwrap();
        (source, engine)
    }

    #[tokio::test]
    async fn test_initial_load() {
        let (source, engine) = create_test_engine().await;

        let snapshot = engine.store().load();
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.resolve("hello").unwrap(), "beforebigbang");
        assert_eq!(source.query_count(), 1);
        assert_eq!(engine.stats().await.successful_reloads, 1);
    }

    #[tokio::test]
    async fn test_initial_load_failure_fails_construction() {
        let source = Arc::new(MemoryDataSource::new("config"));
        source.set_available(false);

        let result = ReloadEngine::new(source, "config").await;
        assert!(matches!(
            result,
            Err(TableConfigError::Reload(ReloadError::SourceUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_invalid_table_name_rejected() {
        let source = Arc::new(MemoryDataSource::new("config"));
        let result = ReloadEngine::new(source.clone(), "config where 1=1").await;

        assert!(matches!(result, Err(TableConfigError::Settings(_))));
        assert_eq!(source.query_count(), 0);
    }

    #[tokio::test]
    async fn test_reload_installs_new_snapshot() {
        let (source, engine) = create_test_engine().await;
        let before = engine.last_reloaded();

        source.upsert("hello", "newworld", "string").await;
        let version = engine.reload().await.unwrap();

        assert_eq!(version, 2);
        let snapshot = engine.store().load();
        assert_eq!(snapshot.resolve("hello").unwrap(), "newworld");
        assert!(engine.last_reloaded() >= before);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_snapshot() {
        let (source, engine) = create_test_engine().await;
        let before = engine.store().load();

        source.upsert("hello", "newworld", "string").await;
        source.set_available(false);

        let result = engine.reload().await;
        assert!(matches!(result, Err(ReloadError::SourceUnavailable(_))));

        let after = engine.store().load();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.loaded_at(), before.loaded_at());

        let stats = engine.stats().await;
        assert_eq!(stats.failed_reloads, 1);
        assert_eq!(stats.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_malformed_row_aborts_reload() {
        let (source, engine) = create_test_engine().await;
        let before = engine.store().load();

        source.upsert("added", "1", "int").await;
        source.upsert_null("broken", "string").await;

        let result = engine.reload().await;
        assert!(matches!(result, Err(ReloadError::MalformedRow { .. })));

        let after = engine.store().load();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(!after.contains("added"));
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let (source, engine) = create_test_engine().await;

        source.set_available(false);
        assert!(engine.reload().await.is_err());
        assert!(engine.reload().await.is_err());
        assert_eq!(engine.stats().await.consecutive_failures, 2);

        source.set_available(true);
        engine.reload().await.unwrap();

        let stats = engine.stats().await;
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.last_error.is_none());
    }

    #[tokio::test]
    async fn test_update_notification() {
        let (source, engine) = create_test_engine().await;
        let mut receiver = engine.subscribe();

        source.upsert("hello", "newworld", "string").await;
        source.upsert("port", "8080", "int").await;
        engine.reload().await.unwrap();

        let update = receiver.recv().await.unwrap();
        assert_eq!(update.version, 2);
        assert_eq!(update.diffs.len(), 2);
        assert_eq!(update.diffs[0].key(), "hello");
        assert!(matches!(update.diffs[1], SnapshotDiff::EntryAdded { .. }));

        // 无变化时不发送通知
        engine.reload().await.unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_overlapping_reloads_install_increasing_versions() {
        let source = Arc::new(SlowFirstReload {
            inner: MemoryDataSource::with_rows(
                "config",
                vec![ConfigRow::new("hello", "beforebigbang", "string")],
            ),
            calls: AtomicUsize::new(0),
        });
        let engine = Arc::new(ReloadEngine::new(source.clone(), "config").await.unwrap());
        let mut receiver = engine.subscribe();

        let slow = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.reload().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        source.inner.upsert("hello", "newworld", "string").await;
        let fast = engine.reload().await.unwrap();
        assert_eq!(engine.store().load().version(), fast);

        let slow = slow.await.unwrap().unwrap();
        assert!(slow > fast, "installed version went backwards: {fast} -> {slow}");
        assert_eq!(engine.store().load().version(), slow);

        let mut last = 1;
        while let Ok(update) = receiver.try_recv() {
            assert!(update.version > last);
            last = update.version;
        }
    }

    #[test]
    fn test_calculate_diff() {
        let old = Snapshot::from_rows(
            vec![
                ConfigRow::new("a", "1", "int"),
                ConfigRow::new("b", "x", "string"),
                ConfigRow::new("c", "same", "string"),
            ],
            1,
            Utc::now(),
        )
        .0;
        let new = Snapshot::from_rows(
            vec![
                ConfigRow::new("a", "2", "int"),
                ConfigRow::new("c", "same", "string"),
                ConfigRow::new("d", "y", "string"),
            ],
            2,
            Utc::now(),
        )
        .0;

        let diffs = ReloadEngine::calculate_diff(&old, &new);
        assert_eq!(diffs.len(), 3);
        assert!(matches!(diffs[0], SnapshotDiff::EntryModified { ref key, .. } if key == "a"));
        assert!(matches!(diffs[1], SnapshotDiff::EntryRemoved { ref key } if key == "b"));
        assert!(matches!(diffs[2], SnapshotDiff::EntryAdded { ref key, .. } if key == "d"));
    }
}
