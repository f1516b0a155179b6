//! 配置快照模块
//!
//! 快照发布后不可变，重载时整体替换，读者通过 `ArcSwap` 无锁获取当前快照

use crate::error::ResolveError;
use crate::source::ConfigRow;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// 快照中的配置项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// 原始字符串值
    pub value: String,
    /// 声明的类型，不参与取值转换
    pub declared_type: String,
}

/// 某一时刻配置表的完整副本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// 配置项
    entries: HashMap<String, ConfigEntry>,
    /// 快照版本号
    version: u64,
    /// 加载时间
    loaded_at: DateTime<Utc>,
}

impl Snapshot {
    /// 由配置行构建新快照，名称重复时后出现的行生效
    ///
    /// # 返回
    /// * `(Self, Vec<String>)` - 快照和重复出现的名称
    pub fn from_rows(
        rows: Vec<ConfigRow>,
        version: u64,
        loaded_at: DateTime<Utc>,
    ) -> (Self, Vec<String>) {
        let mut entries = HashMap::with_capacity(rows.len());
        let mut duplicates = Vec::new();

        for row in rows {
            let entry = ConfigEntry {
                value: row.value,
                declared_type: row.declared_type,
            };
            if entries.insert(row.name.clone(), entry).is_some() {
                duplicates.push(row.name);
            }
        }

        (
            Self {
                entries,
                version,
                loaded_at,
            },
            duplicates,
        )
    }

    /// 空快照
    pub fn empty(version: u64, loaded_at: DateTime<Utc>) -> Self {
        Self {
            entries: HashMap::new(),
            version,
            loaded_at,
        }
    }

    /// 快照版本号
    pub fn version(&self) -> u64 {
        self.version
    }

    /// 加载时间
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// 配置项数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 是否包含指定配置项
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 获取配置项
    pub fn entry(&self, key: &str) -> Option<&ConfigEntry> {
        self.entries.get(key)
    }

    /// 获取全部配置项
    pub fn entries(&self) -> &HashMap<String, ConfigEntry> {
        &self.entries
    }

    /// 按名称排序的全部键
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 获取声明的类型
    pub fn declared_type(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.declared_type.as_str())
    }

    /// 精确查询配置值
    pub fn resolve(&self, key: &str) -> Result<String, ResolveError> {
        self.entries
            .get(key)
            .map(|e| e.value.clone())
            .ok_or_else(|| ResolveError::NotFound {
                key: key.to_string(),
            })
    }

    /// 查询配置值，不存在时返回默认值
    pub fn resolve_or_default(&self, key: &str, default: &str) -> String {
        self.entries
            .get(key)
            .map(|e| e.value.clone())
            .unwrap_or_else(|| default.to_string())
    }

    /// 查询 i32 配置值
    ///
    /// 配置项不存在时返回默认值；存在但无法解析时返回 `ResolveError::Parse`
    pub fn resolve_int(&self, key: &str, default: i32) -> Result<i32, ResolveError> {
        self.resolve_parsed(key, default, "int")
    }

    /// 查询 i64 配置值
    pub fn resolve_int64(&self, key: &str, default: i64) -> Result<i64, ResolveError> {
        self.resolve_parsed(key, default, "int64")
    }

    /// 查询 f64 配置值
    pub fn resolve_float(&self, key: &str, default: f64) -> Result<f64, ResolveError> {
        self.resolve_parsed(key, default, "float")
    }

    /// 查询布尔配置值，接受 true/false/1/0
    pub fn resolve_bool(&self, key: &str, default: bool) -> Result<bool, ResolveError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(default);
        };

        match entry.value.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ResolveError::Parse {
                key: key.to_string(),
                value: entry.value.clone(),
                target: "bool",
                reason: "期望 true/false/1/0".to_string(),
            }),
        }
    }

    fn resolve_parsed<T>(
        &self,
        key: &str,
        default: T,
        target: &'static str,
    ) -> Result<T, ResolveError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(entry) = self.entries.get(key) else {
            return Ok(default);
        };

        entry.value.parse::<T>().map_err(|e| ResolveError::Parse {
            key: key.to_string(),
            value: entry.value.clone(),
            target,
            reason: e.to_string(),
        })
    }
}

/// 当前快照的持有者，单写多读
#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    /// 使用初始快照创建
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// 获取当前快照
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// 原子替换当前快照，返回被替换的快照
    pub fn swap(&self, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        self.current.swap(snapshot)
    }
}
