//! SQL数据源实现
//!
//! 基于 sqlx 的 Any 驱动，同时支持 MySQL 和 SQLite

use crate::config::types::DatabaseSettings;
use crate::error::SourceError;
use crate::source::{ConfigRow, DataSource};
use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Connection, Row};
use std::time::Duration;
use tracing::{debug, info};

/// SQL数据源
#[derive(Debug, Clone)]
pub struct SqlDataSource {
    /// 连接池
    pool: AnyPool,
}

impl SqlDataSource {
    /// 根据数据库配置建立连接池
    ///
    /// # 参数
    /// * `settings` - 数据库配置
    ///
    /// # 返回
    /// * `Result<Self, SourceError>` - 数据源实例
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, SourceError> {
        sqlx::any::install_default_drivers();

        let url = settings.connection_url();
        let pool = AnyPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .connect(&url)
            .await
            .map_err(|e| SourceError::Unavailable(format!("连接数据库失败: {e}")))?;

        info!("已连接配置数据库: {}", settings.redacted_url());
        Ok(Self { pool })
    }

    /// 使用已有的连接池创建数据源
    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// 获取连接池
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn scan_row(index: usize, row: &sqlx::any::AnyRow) -> Result<ConfigRow, SourceError> {
        let malformed = |e: sqlx::Error| SourceError::MalformedRow {
            row: index,
            reason: e.to_string(),
        };

        Ok(ConfigRow {
            name: row.try_get::<String, _>("name").map_err(malformed)?,
            value: row.try_get::<String, _>("value").map_err(malformed)?,
            declared_type: row.try_get::<String, _>("type").map_err(malformed)?,
        })
    }
}

#[async_trait]
impl DataSource for SqlDataSource {
    async fn query_all(&self, table: &str) -> Result<Vec<ConfigRow>, SourceError> {
        // 表名无法作为参数绑定，调用方需保证已通过标识符校验
        let sql = format!("SELECT name, value, type FROM {table}");

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        debug!("从 {} 读取到 {} 行", table, rows.len());

        rows.iter()
            .enumerate()
            .map(|(index, row)| Self::scan_row(index, row))
            .collect()
    }

    async fn ping(&self) -> Result<(), SourceError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        conn.ping()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))
    }

    async fn query_scalar(&self, sql: &str) -> Result<i64, SourceError> {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_source() -> SqlDataSource {
        let settings = DatabaseSettings {
            url: Some("sqlite::memory:".to_string()),
            max_connections: 1,
            ..DatabaseSettings::development()
        };
        let source = SqlDataSource::connect(&settings).await.unwrap();

        sqlx::query("CREATE TABLE config (name TEXT PRIMARY KEY, value TEXT, type TEXT NOT NULL)")
            .execute(source.pool())
            .await
            .unwrap();

        source
    }

    #[tokio::test]
    async fn test_query_all_empty_table() {
        let source = create_test_source().await;
        let rows = source.query_all("config").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_query_all_reads_rows() {
        let source = create_test_source().await;
        sqlx::query("INSERT INTO config (name, value, type) VALUES (?, ?, ?)")
            .bind("hello")
            .bind("beforebigbang")
            .bind("string")
            .execute(source.pool())
            .await
            .unwrap();

        let rows = source.query_all("config").await.unwrap();
        assert_eq!(rows, vec![ConfigRow::new("hello", "beforebigbang", "string")]);
    }

    #[tokio::test]
    async fn test_null_value_is_malformed_row() {
        let source = create_test_source().await;
        sqlx::query("INSERT INTO config (name, value, type) VALUES ('broken', NULL, 'string')")
            .execute(source.pool())
            .await
            .unwrap();

        let result = source.query_all("config").await;
        assert!(matches!(result, Err(SourceError::MalformedRow { row: 0, .. })));
    }

    #[tokio::test]
    async fn test_missing_table_is_unavailable() {
        let source = create_test_source().await;
        let result = source.query_all("no_such_table").await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_ping_and_probe() {
        let source = create_test_source().await;
        assert!(source.ping().await.is_ok());
        assert_eq!(source.query_scalar("SELECT 1").await.unwrap(), 1);
    }
}
