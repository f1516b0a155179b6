//! Table Config 主程序入口
//!
//! 查询、导出和监听数据库配置表

use anyhow::{Context, Result};
use clap::Parser;
use table_config::cli::args::{Args, Commands};
use table_config::cli::commands::{
    load_settings, CheckCommand, Command, DumpCommand, GetCommand, ValidateCommand,
    VersionCommand, WatchCommand,
};
use table_config::logging::{LogConfig, LoggingSystem};
use tracing::{debug, error};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统，命令行级别优先于配置文件
    let logging = load_settings(&args)
        .await
        .map(|settings| settings.logging)
        .unwrap_or_default();
    let mut log_config = LogConfig::from_settings(&logging);
    if let Some(level) = args.log_level.clone() {
        log_config.level = level.into();
    }

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    debug!("Table Config v{} 启动", table_config::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Get { .. } => Box::new(GetCommand),
        Commands::Dump { .. } => Box::new(DumpCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Watch { .. } => Box::new(WatchCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
