//! confhub 主程序入口
//!
//! 目录式配置管理器

use anyhow::{Context, Result};
use clap::Parser;
use confhub::cli::{command_for, Args, Command};
use confhub::logging::{LogSettings, LoggingSystem};
use tracing::{debug, error};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 加载配置之前先用命令行指定的级别初始化日志
    let settings = LogSettings::bootstrap(&args.log_level.to_string())
        .context("解析日志级别失败")?;
    LoggingSystem::init(settings).context("初始化日志系统失败")?;

    debug!("confhub v{} 启动", confhub::VERSION);

    // 执行命令
    if let Err(e) = command_for(&args).execute(&args).await {
        error!("命令执行失败: {}", e);
        eprintln!("错误: {e}");
        std::process::exit(1);
    }

    Ok(())
}
