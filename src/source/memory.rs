//! 内存数据源实现
//!
//! 在进程内模拟一张配置表，可模拟连接中断和NULL值，用于嵌入和测试

use crate::error::SourceError;
use crate::source::{ConfigRow, DataSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// 内存中的一行，值为 `None` 时对应数据库中的 NULL
#[derive(Debug, Clone)]
struct StoredRow {
    name: String,
    value: Option<String>,
    declared_type: String,
}

/// 内存数据源
#[derive(Debug)]
pub struct MemoryDataSource {
    /// 表名
    table: String,
    /// 行数据
    rows: RwLock<Vec<StoredRow>>,
    /// 是否可连接
    available: AtomicBool,
    /// `query_all` 调用次数
    query_count: AtomicUsize,
}

impl MemoryDataSource {
    /// 创建空表
    ///
    /// # 参数
    /// * `table` - 表名，查询其他表名时返回 `Unavailable`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            query_count: AtomicUsize::new(0),
        }
    }

    /// 使用初始数据创建表
    pub fn with_rows(table: impl Into<String>, rows: Vec<ConfigRow>) -> Self {
        let stored = rows
            .into_iter()
            .map(|row| StoredRow {
                name: row.name,
                value: Some(row.value),
                declared_type: row.declared_type,
            })
            .collect();

        Self {
            rows: RwLock::new(stored),
            ..Self::new(table)
        }
    }

    /// 插入或更新一行
    pub async fn upsert(&self, name: &str, value: &str, declared_type: &str) {
        self.put(name, Some(value.to_string()), declared_type).await;
    }

    /// 插入值为 NULL 的一行
    pub async fn upsert_null(&self, name: &str, declared_type: &str) {
        self.put(name, None, declared_type).await;
    }

    async fn put(&self, name: &str, value: Option<String>, declared_type: &str) {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|row| row.name == name) {
            Some(row) => {
                row.value = value;
                row.declared_type = declared_type.to_string();
            }
            None => rows.push(StoredRow {
                name: name.to_string(),
                value,
                declared_type: declared_type.to_string(),
            }),
        }
    }

    /// 删除一行，返回是否存在
    pub async fn remove(&self, name: &str) -> bool {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| row.name != name);
        rows.len() != before
    }

    /// 设置数据源是否可连接
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 获取 `query_all` 的调用次数
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), SourceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SourceError::Unavailable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn query_all(&self, table: &str) -> Result<Vec<ConfigRow>, SourceError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        if table != self.table {
            return Err(SourceError::Unavailable(format!("表不存在: {table}")));
        }

        let rows = self.rows.read().await;
        rows.iter()
            .enumerate()
            .map(|(index, row)| match &row.value {
                Some(value) => Ok(ConfigRow::new(
                    row.name.clone(),
                    value.clone(),
                    row.declared_type.clone(),
                )),
                None => Err(SourceError::MalformedRow {
                    row: index,
                    reason: format!("列 value 为 NULL (name = {})", row.name),
                }),
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), SourceError> {
        self.ensure_available()
    }

    async fn query_scalar(&self, sql: &str) -> Result<i64, SourceError> {
        self.ensure_available()?;

        // 只识别 `SELECT <整数>` 形式的探测语句
        let literal = sql
            .trim()
            .strip_prefix("SELECT ")
            .or_else(|| sql.trim().strip_prefix("select "))
            .ok_or_else(|| SourceError::Unavailable(format!("不支持的查询: {sql}")))?;

        literal
            .trim()
            .parse::<i64>()
            .map_err(|e| SourceError::Unavailable(format!("不支持的查询: {sql} ({e})")))
    }
}
