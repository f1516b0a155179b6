//! 数据源适配器模块
//!
//! 定义配置表的读取接口以及SQL和内存两种实现

pub mod memory;
pub mod sql;

use crate::error::SourceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// 重新导出主要类型
pub use memory::MemoryDataSource;
pub use sql::SqlDataSource;

/// 配置表中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRow {
    /// 配置项名称（唯一键）
    pub name: String,
    /// 原始字符串值
    pub value: String,
    /// 声明的类型，仅作为元数据
    pub declared_type: String,
}

impl ConfigRow {
    /// 创建新的配置行
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        declared_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            declared_type: declared_type.into(),
        }
    }
}

/// 数据源trait，定义配置表的访问接口
///
/// 实现必须可以被重载任务和健康检测并发使用
#[async_trait]
pub trait DataSource: Send + Sync {
    /// 读取配置表的全部行
    ///
    /// # 参数
    /// * `table` - 表名
    ///
    /// # 返回
    /// * `Result<Vec<ConfigRow>, SourceError>` - 查询失败返回 `Unavailable`，
    ///   某一行无法读取返回 `MalformedRow`
    async fn query_all(&self, table: &str) -> Result<Vec<ConfigRow>, SourceError>;

    /// 检测数据源是否可连接
    async fn ping(&self) -> Result<(), SourceError>;

    /// 执行返回单个整数的查询
    ///
    /// # 参数
    /// * `sql` - 查询语句
    async fn query_scalar(&self, sql: &str) -> Result<i64, SourceError>;
}
