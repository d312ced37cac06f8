//! 应用配置
//!
//! TOML文件 + `SYSJOB_` 前缀环境变量，文件不存在时使用内置默认值。

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub log: LogConfig,
    pub scheduler: SchedulerConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    /// "json" 或 "pretty"
    pub format: String,
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 调度循环扫描间隔（毫秒）
    pub tick_interval_ms: u64,
    /// 普通任务池容量
    pub worker_pool_size: usize,
    /// 重型任务池容量
    pub heavy_pool_size: usize,
    /// 生命周期事件通道容量
    pub event_channel_capacity: usize,
    /// 优雅关闭时等待在途任务的上限（秒）
    pub shutdown_timeout_seconds: u64,
    /// 调用目标白名单前缀
    pub allowed_target_prefixes: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log: LogConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            scheduler: SchedulerConfig {
                tick_interval_ms: 500,
                worker_pool_size: 20,
                heavy_pool_size: 5,
                event_channel_capacity: 256,
                shutdown_timeout_seconds: 30,
                allowed_target_prefixes: vec!["tasks".to_string()],
            },
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/sysjob.toml", "sysjob.toml", "/etc/sysjob/config.toml"];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        let defaults = AppConfig::default();
        builder = builder
            .set_default("log.level", defaults.log.level.clone())?
            .set_default("log.format", defaults.log.format.clone())?
            .set_default(
                "scheduler.tick_interval_ms",
                defaults.scheduler.tick_interval_ms,
            )?
            .set_default(
                "scheduler.worker_pool_size",
                defaults.scheduler.worker_pool_size as u64,
            )?
            .set_default(
                "scheduler.heavy_pool_size",
                defaults.scheduler.heavy_pool_size as u64,
            )?
            .set_default(
                "scheduler.event_channel_capacity",
                defaults.scheduler.event_channel_capacity as u64,
            )?
            .set_default(
                "scheduler.shutdown_timeout_seconds",
                defaults.scheduler.shutdown_timeout_seconds,
            )?
            .set_default(
                "scheduler.allowed_target_prefixes",
                defaults.scheduler.allowed_target_prefixes.clone(),
            )?;

        builder = builder.add_source(
            Environment::with_prefix("SYSJOB")
                .separator("_")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.log.format.as_str(), "json" | "pretty") {
            return Err(anyhow::anyhow!("不支持的日志格式: {}", self.log.format));
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(anyhow::anyhow!("扫描间隔必须大于0"));
        }
        if self.scheduler.worker_pool_size == 0 || self.scheduler.heavy_pool_size == 0 {
            return Err(anyhow::anyhow!("工作池容量必须大于0"));
        }
        if self.scheduler.allowed_target_prefixes.is_empty() {
            return Err(anyhow::anyhow!("调用目标白名单不能为空"));
        }
        Ok(())
    }
}
