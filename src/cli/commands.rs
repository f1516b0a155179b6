//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{get_default_config_path, Settings, SettingsLoader, TomlSettingsLoader};
use crate::error::{Result, SettingsError};
use crate::health::{HealthChecker, HealthStatus, SourceHealthChecker};
use crate::reload::SnapshotDiff;
use crate::reloading::ReloadingConfig;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::source::SqlDataSource;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载配置文件
///
/// 显式指定的文件必须存在；未指定时使用默认路径，默认路径不存在则使用内置默认值
pub async fn load_settings(args: &Args) -> Result<Settings> {
    let loader = TomlSettingsLoader::default();

    match &args.config {
        Some(path) => loader.load_from_file(path).await,
        None => {
            let path = get_default_config_path();
            if path.exists() {
                loader.load_from_file(&path).await
            } else {
                info!("未找到配置文件 {}，使用默认配置", path.display());
                Ok(Settings::default())
            }
        }
    }
}

/// 查询单个配置项
pub struct GetCommand;

#[async_trait]
impl Command for GetCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Get {
            key,
            default,
            format,
        } = &args.command
        {
            let settings = load_settings(args).await?;
            let config = ReloadingConfig::connect(&settings).await?;

            let value = match default {
                Some(default) => config.resolve_or_default(key, default),
                None => config.resolve(key)?,
            };

            match format {
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "key": key,
                        "value": value,
                        "declared_type": config.resolver().declared_type(key),
                        "version": config.snapshot().version(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => println!("{}", value),
            }
        }
        Ok(())
    }
}

/// 输出全部配置项
pub struct DumpCommand;

#[async_trait]
impl Command for DumpCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Dump { format } = &args.command {
            let settings = load_settings(args).await?;
            let config = ReloadingConfig::connect(&settings).await?;
            let snapshot = config.snapshot();

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&*snapshot)?);
                }
                OutputFormat::Text => {
                    println!(
                        "配置表: {} (版本 {}, 加载于 {})",
                        config.table_name(),
                        snapshot.version(),
                        snapshot.loaded_at().to_rfc3339()
                    );
                    for key in snapshot.keys() {
                        if let Some(entry) = snapshot.entry(&key) {
                            println!("{} = {} [{}]", key, entry.value, entry.declared_type);
                        }
                    }
                    println!("共 {} 项", snapshot.len());
                }
            }
        }
        Ok(())
    }
}

/// 健康检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { format } = &args.command {
            let settings = load_settings(args).await?;
            let source = SqlDataSource::connect(&settings.database).await?;
            let checker = SourceHealthChecker::new(Arc::new(source));
            let report = checker.report().await;

            match format {
                OutputFormat::Json => println!("{}", report.to_json()?),
                OutputFormat::Text => {
                    println!("数据源: {}", settings.database.redacted_url());
                    println!("状态: {}", report.status);
                    println!("耗时: {}ms", report.response_time_ms());
                    if let Some(message) = &report.error_message {
                        println!("错误: {}", message);
                    }
                }
            }

            if report.status == HealthStatus::Down {
                return Err(anyhow::anyhow!("数据源健康检测失败").into());
            }
        }
        Ok(())
    }
}

/// 持续重载并输出变更
pub struct WatchCommand;

#[async_trait]
impl Command for WatchCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Watch { interval } = &args.command {
            let mut settings = load_settings(args).await?;
            if let Some(seconds) = interval {
                if *seconds == 0 {
                    return Err(
                        SettingsError::ValidationError("重载间隔不能为0".to_string()).into(),
                    );
                }
                settings.reload.interval_seconds = *seconds;
            }

            let config = ReloadingConfig::connect(&settings).await?;
            let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());
            let mut updates = config.subscribe();

            config.start_auto_reload(Arc::clone(&scheduler)).await?;
            println!(
                "正在监听配置表 {} (版本 {}, {} 项)，按 Ctrl-C 退出",
                config.table_name(),
                config.snapshot().version(),
                config.snapshot().len()
            );

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("收到中断信号，停止监听");
                        break;
                    }
                    update = updates.recv() => match update {
                        Ok(update) => {
                            println!("版本 {} ({})", update.version, update.timestamp.to_rfc3339());
                            for diff in &update.diffs {
                                println!("  {}", describe_diff(diff));
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("变更通知处理过慢，跳过 {} 条", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            config.stop_auto_reload().await;
            scheduler.stop().await?;
        }
        Ok(())
    }
}

/// 格式化单条变更
fn describe_diff(diff: &SnapshotDiff) -> String {
    match diff {
        SnapshotDiff::EntryAdded { key, entry } => format!("+ {} = {}", key, entry.value),
        SnapshotDiff::EntryRemoved { key } => format!("- {}", key),
        SnapshotDiff::EntryModified { key, old, new } => {
            format!("~ {}: {} -> {}", key, old.value, new.value)
        }
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { config_path } = &args.command {
            let path: PathBuf = config_path
                .clone()
                .or_else(|| args.config.clone())
                .unwrap_or_else(get_default_config_path);

            println!("验证配置文件: {}", path.display());

            let loader = TomlSettingsLoader::default();
            match loader.load_from_file(&path).await {
                Ok(settings) => {
                    println!("✓ 配置文件验证通过");
                    println!("  数据源: {}", settings.database.redacted_url());
                    println!("  配置表: {}", settings.database.table);
                    println!("  重载间隔: {}秒", settings.reload.interval_seconds);
                    println!("  日志级别: {}", settings.logging.level);
                }
                Err(e) => {
                    println!("✗ 配置文件验证失败: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ConfigEntry;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_describe_diff() {
        let entry = |value: &str| ConfigEntry {
            value: value.to_string(),
            declared_type: "string".to_string(),
        };

        assert_eq!(
            describe_diff(&SnapshotDiff::EntryAdded {
                key: "hello".to_string(),
                entry: entry("newworld"),
            }),
            "+ hello = newworld"
        );
        assert_eq!(
            describe_diff(&SnapshotDiff::EntryRemoved {
                key: "hello".to_string()
            }),
            "- hello"
        );
        assert_eq!(
            describe_diff(&SnapshotDiff::EntryModified {
                key: "hello".to_string(),
                old: entry("beforebigbang"),
                new: entry("newworld"),
            }),
            "~ hello: beforebigbang -> newworld"
        );
    }

    #[tokio::test]
    async fn test_load_settings_from_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[database]\ntable = \"app_config\"\n\n[reload]\ninterval_seconds = 5").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let args = Args::try_parse_from(["table-config", "--config", &path, "dump"]).unwrap();

        let settings = load_settings(&args).await.unwrap();
        assert_eq!(settings.database.table, "app_config");
        assert_eq!(settings.reload.interval_seconds, 5);
    }

    #[tokio::test]
    async fn test_load_settings_missing_explicit_file() {
        let args = Args::try_parse_from([
            "table-config",
            "--config",
            "/nonexistent/table-config.toml",
            "dump",
        ])
        .unwrap();

        assert!(load_settings(&args).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_command_rejects_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[database]\ntable = \"config; DROP TABLE x\"").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let args = Args::try_parse_from(["table-config", "validate", &path]).unwrap();

        assert!(ValidateCommand.execute(&args).await.is_err());
    }

    #[tokio::test]
    async fn test_version_command() {
        let args = Args::try_parse_from(["table-config", "version", "--format", "json"]).unwrap();
        assert!(VersionCommand.execute(&args).await.is_ok());
    }
}
