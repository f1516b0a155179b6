//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Table Config 的主要错误类型
#[derive(Error, Debug)]
pub enum TableConfigError {
    /// 配置文件相关错误
    #[error("配置错误: {0}")]
    Settings(#[from] SettingsError),

    /// 数据源错误
    #[error("数据源错误: {0}")]
    Source(#[from] SourceError),

    /// 重载错误
    #[error("重载错误: {0}")]
    Reload(#[from] ReloadError),

    /// 查询配置项错误
    #[error("解析错误: {0}")]
    Resolve(#[from] ResolveError),

    /// 健康检测错误
    #[error("健康检测错误: {0}")]
    Health(#[from] HealthError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置文件错误类型
#[derive(Error, Debug)]
pub enum SettingsError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 数据源适配器错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// 连接或查询失败
    #[error("数据源不可用: {0}")]
    Unavailable(String),

    /// 读取某一行时失败
    #[error("第 {row} 行数据格式错误: {reason}")]
    MalformedRow { row: usize, reason: String },
}

/// 重载错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReloadError {
    /// 查询配置表失败
    #[error("配置表查询失败: {0}")]
    SourceUnavailable(String),

    /// 扫描行数据失败
    #[error("配置表第 {row} 行无法读取: {reason}")]
    MalformedRow { row: usize, reason: String },
}

impl From<SourceError> for ReloadError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(msg) => ReloadError::SourceUnavailable(msg),
            SourceError::MalformedRow { row, reason } => ReloadError::MalformedRow { row, reason },
        }
    }
}

/// 配置项查询错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// 配置项不存在
    #[error("配置项不存在: {key}")]
    NotFound { key: String },

    /// 配置值无法转换为目标类型
    #[error("配置项 {key} 的值 {value:?} 无法转换为 {target}: {reason}")]
    Parse {
        key: String,
        value: String,
        target: &'static str,
        reason: String,
    },
}

impl ResolveError {
    /// 判断是否为配置项不存在
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound { .. })
    }
}

/// 健康检测错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealthError {
    /// 数据源无法连接
    #[error("数据源无法连接: {0}")]
    Unreachable(String),

    /// 探测查询执行失败
    #[error("探测查询失败: {0}")]
    QueryFailed(String),

    /// 探测查询返回值不符
    #[error("探测值不匹配: 期望 {expected}, 实际 {actual}")]
    EchoMismatch { expected: i64, actual: i64 },
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, TableConfigError>;
