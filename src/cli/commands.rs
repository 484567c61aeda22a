//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, ConfigFormat, OutputFormat};
use crate::config::{ConfigLoader, ConfigManager, DirectoryConfigLoader};
use crate::error::{ConfigError, Result};
use crate::logging::{logger_hook, LogSettings, LoggingSystem};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 运行命令：加载配置并持续热重载，直到收到 Ctrl+C
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Run { debounce_ms } = &args.command else {
            return Ok(());
        };

        let config_dir = args.get_config_folder();
        let manager = Arc::new(ConfigManager::new());
        let snapshot = manager.load(&config_dir)?;

        // 首次加载不触发钩子，直接应用日志配置
        LoggingSystem::init(LogSettings::from_config(&snapshot.log)?)?;
        manager.register_hook(logger_hook());

        let handle = manager.start_watching(Duration::from_millis(*debounce_ms))?;
        info!(
            path = %config_dir.display(),
            version = snapshot.version,
            "confhub 已启动，按 Ctrl+C 停止"
        );

        tokio::signal::ctrl_c().await?;
        info!("收到中断信号，正在停止...");
        handle.shutdown().await;
        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Validate { verbose } = &args.command else {
            return Ok(());
        };

        let config_dir = args.get_config_folder();
        println!("验证配置目录: {}", config_dir.display());

        let loaded = match DirectoryConfigLoader::new().load_dir(&config_dir) {
            Ok(loaded) => loaded,
            Err(ConfigError::Validation { violations }) => {
                println!("✗ 配置验证失败，共 {} 个问题:", violations.len());
                for violation in &violations {
                    println!("  - {violation}");
                }
                return Err(ConfigError::Validation { violations }.into());
            }
            Err(e) => return Err(e.into()),
        };

        println!("✓ 配置验证通过");
        if *verbose {
            let config = &loaded.config;
            println!("日志: {} / {}", config.log.level, config.log.format);
            println!("服务端口: {}", config.server.port);
            println!("内部端口: {}", config.internal_server.port);
            if let Some(database) = &config.database {
                println!("数据库驱动: {}", database.driver);
                println!("只读副本: {}", database.replica_connection_urls.len());
            }
            println!("链路追踪: {}", if config.tracing.enabled { "启用" } else { "禁用" });
            println!(
                "OIDC 认证: {}",
                if config.oidc_authentication.is_some() { "已配置" } else { "未配置" }
            );
            println!("密钥文件:");
            for path in &loaded.secret_paths {
                println!("  {}", path.display());
            }
        }
        Ok(())
    }
}

/// 输出有效配置命令
pub struct ShowCommand;

#[async_trait]
impl Command for ShowCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Show {
            format,
            show_secrets,
        } = &args.command
        else {
            return Ok(());
        };

        let loaded = DirectoryConfigLoader::new().load_dir(&args.get_config_folder())?;
        let config = if *show_secrets {
            loaded.config
        } else {
            loaded.config.redacted()
        };

        match format {
            ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            ConfigFormat::Yaml => print!("{}", serde_yaml::to_string(&config)?),
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

/// 根据子命令选择处理器
pub fn command_for(args: &Args) -> Box<dyn Command> {
    match args.command {
        Commands::Run { .. } => Box::new(RunCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Show { .. } => Box::new(ShowCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn args_for(dir: &TempDir, command: &[&str]) -> Args {
        let mut argv = vec!["confhub", "-c", dir.path().to_str().unwrap()];
        argv.extend_from_slice(command);
        Args::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_validate_reports_failure() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.yaml"), "log:\n  level: loud\n").unwrap();

        let args = args_for(&dir, &["validate"]);
        let result = command_for(&args).execute(&args).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_validate_and_show_succeed() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("db.yaml"),
            "database:\n  connectionUrl:\n    value: postgres://localhost/app\n",
        )
        .unwrap();

        let args = args_for(&dir, &["validate", "--verbose"]);
        command_for(&args).execute(&args).await.unwrap();

        let args = args_for(&dir, &["show", "--format", "json"]);
        command_for(&args).execute(&args).await.unwrap();
    }
}
