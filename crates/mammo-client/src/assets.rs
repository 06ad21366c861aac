//! 影像资源URL解析
//!
//! 后端返回的 `file_path` 是相对路径（如 `/uploads/patients/3/x.png`），
//! 需要拼接到可配置的资源源站上；绝对URL原样透传。

use mammo_core::config::AppConfig;

/// 资源URL解析器
#[derive(Debug, Clone)]
pub struct AssetResolver {
    origin: String,
}

impl AssetResolver {
    /// 从配置构建；未配置资源源站时回退到API根地址
    pub fn from_config(config: &AppConfig) -> Self {
        let origin = config
            .assets
            .origin
            .as_deref()
            .unwrap_or(&config.api.base_url);
        Self {
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    /// 解析单个影像路径
    pub fn resolve(&self, file_path: &str) -> String {
        if file_path.starts_with("http://") || file_path.starts_with("https://") {
            return file_path.to_string();
        }

        if file_path.starts_with('/') {
            format!("{}{}", self.origin, file_path)
        } else {
            format!("{}/{}", self.origin, file_path)
        }
    }
}
