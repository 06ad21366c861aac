//! 配置管理
//!
//! 提供统一的配置加载，支持配置文件与环境变量叠加。

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MammoError, Result};

/// 系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 后端API配置
    pub api: ApiConfig,
    /// 静态资源配置
    pub assets: AssetConfig,
    /// 分析器配置
    pub analyzer: AnalyzerConfig,
}

/// 后端API配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API根地址
    pub base_url: String,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// 静态资源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// 相对影像路径的解析源；为空时回退到API根地址
    pub origin: Option<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self { origin: None }
    }
}

/// 分析器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// 模拟分析的步进间隔（毫秒）
    pub tick_interval_ms: u64,
    /// 每次步进的进度增量（百分点）
    pub progress_step: u8,
    /// 导入完成前的过渡延迟（毫秒）
    pub upload_transition_ms: u64,
    /// 临时提示消息的存活时间（毫秒）
    pub notice_ttl_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 300,
            progress_step: 10,
            upload_transition_ms: 800,
            notice_ttl_ms: 4000,
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 优先级：环境变量（`MAMMO_` 前缀） > 配置文件 > 内置默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        builder = builder.add_source(Environment::with_prefix("MAMMO").separator("__"));

        let settings = builder
            .build()
            .map_err(|e| MammoError::Config(e.to_string()))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| MammoError::Config(e.to_string()))?;

        config.validate()?;
        info!("Configuration loaded, api base: {}", config.api.base_url);
        Ok(config)
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(MammoError::Config("api.base_url must not be empty".to_string()));
        }
        if self.analyzer.progress_step == 0 || self.analyzer.progress_step > 100 {
            return Err(MammoError::Config(
                "analyzer.progress_step must be in 1..=100".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analyzer.progress_step, 10);
        assert_eq!(config.analyzer.tick_interval_ms, 300);
    }

    #[test]
    fn test_invalid_progress_step_rejected() {
        let mut config = AppConfig::default();
        config.analyzer.progress_step = 0;
        assert!(config.validate().is_err());
    }
}
