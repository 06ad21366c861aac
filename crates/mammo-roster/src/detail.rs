//! 患者详情加载
//!
//! 拉取单个患者的完整记录，分析历史按日期从新到旧排序，
//! 影像路径统一解析为可访问的URL。

use mammo_client::{AssetResolver, PatientApi};
use mammo_core::{AnalysisSummary, Result};
use std::sync::Arc;
use tracing::debug;

/// 详情视图
#[derive(Debug, Clone)]
pub struct PatientDetailView {
    pub id: i64,
    pub name: String,
    pub age: u32,
    pub last_scan: String,
    pub total_scans: u32,
    pub status: String,
    pub risk_level: String,
    pub avatar: Option<String>,
    /// 按日期从新到旧
    pub analyses: Vec<AnalysisSummary>,
    /// 已解析的影像URL，顺序与服务端一致
    pub image_urls: Vec<String>,
}

/// 详情加载器
#[derive(Clone)]
pub struct DetailLoader {
    api: Arc<dyn PatientApi>,
    resolver: AssetResolver,
}

impl DetailLoader {
    pub fn new(api: Arc<dyn PatientApi>, resolver: AssetResolver) -> Self {
        Self { api, resolver }
    }

    /// 加载患者详情；幂等，同一ID可反复调用
    pub async fn load(&self, id: i64) -> Result<PatientDetailView> {
        let detail = self.api.get_patient(id).await?;
        debug!(
            "Loaded detail for patient {}: {} analyses, {} images",
            id,
            detail.analyses.len(),
            detail.images.len()
        );

        let mut analyses = detail.analyses;
        analyses.sort_by(|a, b| b.date.cmp(&a.date));

        let image_urls = detail
            .images
            .iter()
            .map(|image| self.resolver.resolve(&image.file_path))
            .collect();

        Ok(PatientDetailView {
            id: detail.id,
            name: detail.name,
            age: detail.age,
            last_scan: detail.last_scan,
            total_scans: detail.total_scans,
            status: detail.status,
            risk_level: detail.risk_level,
            avatar: detail.avatar,
            analyses,
            image_urls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mammo_client::testing::InMemoryPatientApi;
    use mammo_core::config::AppConfig;
    use mammo_core::{MammoError, MammogramImage, PatientDetail};

    fn sample_detail() -> PatientDetail {
        PatientDetail {
            id: 3,
            name: "Maria Garcia".to_string(),
            age: 48,
            last_scan: "2025-11-12".to_string(),
            total_scans: 3,
            status: "Pending Review".to_string(),
            risk_level: "Moderate".to_string(),
            avatar: None,
            analyses: vec![
                AnalysisSummary {
                    id: 1,
                    date: Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap(),
                    result: "Normal".to_string(),
                    confidence: 98.5,
                    status: "Completed".to_string(),
                },
                AnalysisSummary {
                    id: 2,
                    date: Utc.with_ymd_and_hms(2025, 11, 12, 8, 45, 0).unwrap(),
                    result: "Suspicious".to_string(),
                    confidence: 87.2,
                    status: "Pending Review".to_string(),
                },
            ],
            images: vec![
                MammogramImage {
                    id: 10,
                    file_path: "/uploads/patients/3/a.png".to_string(),
                    uploaded_at: Utc.with_ymd_and_hms(2025, 11, 12, 8, 0, 0).unwrap(),
                },
                MammogramImage {
                    id: 11,
                    file_path: "https://cdn.example.com/b.png".to_string(),
                    uploaded_at: Utc.with_ymd_and_hms(2025, 11, 12, 8, 1, 0).unwrap(),
                },
            ],
        }
    }

    fn loader(api: Arc<InMemoryPatientApi>) -> DetailLoader {
        DetailLoader::new(
            api as Arc<dyn PatientApi>,
            AssetResolver::from_config(&AppConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_detail_sorted_newest_first_and_urls_resolved() {
        let api = Arc::new(InMemoryPatientApi::new());
        api.insert_detail(sample_detail());

        let view = loader(api).load(3).await.unwrap();

        assert_eq!(view.analyses.len(), 2);
        assert_eq!(view.analyses[0].result, "Suspicious");
        assert_eq!(view.analyses[1].result, "Normal");

        assert_eq!(
            view.image_urls,
            vec![
                "http://localhost:8000/uploads/patients/3/a.png".to_string(),
                "https://cdn.example.com/b.png".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_patient_is_not_found() {
        let api = Arc::new(InMemoryPatientApi::new());
        let result = loader(api).load(999).await;
        assert!(matches!(result, Err(MammoError::NotFound(_))));
    }
}
