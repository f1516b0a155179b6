//! 配置查询模块
//!
//! 基于当前快照的只读类型化查询接口，不访问数据源

use crate::error::ResolveError;
use crate::snapshot::{Snapshot, SnapshotStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 配置查询器
///
/// 每次调用读取调用时刻的当前快照。需要在同一快照上连续查询多个配置项时，
/// 先调用 [`Resolver::snapshot`] 再在返回的快照上查询。
#[derive(Debug, Clone)]
pub struct Resolver {
    store: Arc<SnapshotStore>,
    table: String,
}

impl Resolver {
    /// 创建查询器
    ///
    /// # 参数
    /// * `store` - 快照存储
    /// * `table` - 配置表名
    pub fn new(store: Arc<SnapshotStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// 获取当前快照
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.load()
    }

    /// 精确查询，配置项不存在时返回 `ResolveError::NotFound`
    pub fn resolve(&self, key: &str) -> Result<String, ResolveError> {
        self.store.load().resolve(key)
    }

    /// 查询配置值，不存在时返回默认值
    pub fn resolve_or_default(&self, key: &str, default: &str) -> String {
        self.store.load().resolve_or_default(key, default)
    }

    /// 查询 i32 配置值
    ///
    /// # 参数
    /// * `key` - 配置项名称
    /// * `default` - 配置项不存在时的返回值
    ///
    /// # 返回
    /// * `Result<i32, ResolveError>` - 配置项存在但无法解析时返回 `ResolveError::Parse`
    pub fn resolve_int(&self, key: &str, default: i32) -> Result<i32, ResolveError> {
        self.store.load().resolve_int(key, default)
    }

    /// 查询 i64 配置值
    pub fn resolve_int64(&self, key: &str, default: i64) -> Result<i64, ResolveError> {
        self.store.load().resolve_int64(key, default)
    }

    /// 查询 f64 配置值
    pub fn resolve_float(&self, key: &str, default: f64) -> Result<f64, ResolveError> {
        self.store.load().resolve_float(key, default)
    }

    /// 查询布尔配置值
    pub fn resolve_bool(&self, key: &str, default: bool) -> Result<bool, ResolveError> {
        self.store.load().resolve_bool(key, default)
    }

    /// 是否包含配置项
    pub fn contains(&self, key: &str) -> bool {
        self.store.load().contains(key)
    }

    /// 声明的类型
    pub fn declared_type(&self, key: &str) -> Option<String> {
        self.store.load().declared_type(key).map(str::to_string)
    }

    /// 全部配置项名称
    pub fn keys(&self) -> Vec<String> {
        self.store.load().keys()
    }

    /// 配置项数量
    pub fn len(&self) -> usize {
        self.store.load().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.store.load().is_empty()
    }

    /// 当前快照版本号
    pub fn version(&self) -> u64 {
        self.store.load().version()
    }

    /// 最后一次成功加载的时间
    pub fn last_reloaded(&self) -> DateTime<Utc> {
        self.store.load().loaded_at()
    }

    /// 配置表名
    pub fn table_name(&self) -> &str {
        &self.table
    }
}
