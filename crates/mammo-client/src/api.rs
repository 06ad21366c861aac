//! 患者API访问模块
//!
//! 以trait抽象后端接口，HTTP实现基于reqwest；测试侧可注入
//! 内存实现，避免对真实后端的依赖。

use async_trait::async_trait;
use mammo_core::config::ApiConfig;
use mammo_core::{
    AnalysisSummary, ImageBlob, MammoError, PatientDetail, PatientPayload, PatientRecord, Result,
    SavedPatientRef, StatCard,
};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 患者API接口
#[async_trait]
pub trait PatientApi: Send + Sync {
    /// 拉取全部患者记录
    async fn list_patients(&self) -> Result<Vec<PatientRecord>>;

    /// 拉取单个患者详情（含历史分析与影像引用）
    async fn get_patient(&self, id: i64) -> Result<PatientDetail>;

    /// 创建患者（multipart，影像随表单一并上传）
    async fn create_patient(
        &self,
        payload: &PatientPayload,
        images: &[ImageBlob],
    ) -> Result<SavedPatientRef>;

    /// 更新患者（JSON，不携带影像）
    ///
    /// 后端返回404时必须映射为 `MammoError::NotFound`，
    /// 由持久化网关决定是否降级为创建。
    async fn update_patient(&self, id: &str, payload: &PatientPayload) -> Result<SavedPatientRef>;

    /// 删除患者
    async fn delete_patient(&self, id: i64) -> Result<()>;

    /// 拉取仪表盘统计卡片
    async fn get_stats(&self) -> Result<Vec<StatCard>>;

    /// 拉取最近的分析记录
    async fn get_recent_analyses(&self) -> Result<Vec<AnalysisSummary>>;
}

/// 基于reqwest的HTTP实现
pub struct HttpPatientApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPatientApi {
    /// 根据API配置构建客户端
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| MammoError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 宽容解析保存响应：响应体缺失或非法JSON不视为失败
    fn parse_saved_ref(body: &str) -> SavedPatientRef {
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => SavedPatientRef::from_value(&value),
            Err(e) => {
                warn!("Save response is not valid JSON, falling back to request id: {}", e);
                SavedPatientRef::default()
            }
        }
    }
}

#[async_trait]
impl PatientApi for HttpPatientApi {
    async fn list_patients(&self) -> Result<Vec<PatientRecord>> {
        debug!("Fetching patient roster");
        let response = self
            .client
            .get(self.url("/api/patients"))
            .send()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MammoError::Api {
                status: response.status().as_u16(),
                message: "failed to list patients".to_string(),
            });
        }

        response
            .json::<Vec<PatientRecord>>()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))
    }

    async fn get_patient(&self, id: i64) -> Result<PatientDetail> {
        debug!("Fetching patient detail: {}", id);
        let response = self
            .client
            .get(self.url(&format!("/api/patients/{id}")))
            .send()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(MammoError::NotFound(format!("patient {id}"))),
            status if status.is_success() => response
                .json::<PatientDetail>()
                .await
                .map_err(|e| MammoError::Network(e.to_string())),
            status => Err(MammoError::Api {
                status: status.as_u16(),
                message: format!("failed to fetch patient {id}"),
            }),
        }
    }

    async fn create_patient(
        &self,
        payload: &PatientPayload,
        images: &[ImageBlob],
    ) -> Result<SavedPatientRef> {
        info!("Creating patient '{}' with {} images", payload.name, images.len());

        let mut form = reqwest::multipart::Form::new()
            .text("name", payload.name.clone())
            .text("age", payload.age.to_string())
            .text("lastScan", payload.last_scan.clone())
            .text("totalScans", payload.total_scans.to_string())
            .text("status", payload.status.clone())
            .text("riskLevel", payload.risk_level.clone());

        for image in images {
            let part = reqwest::multipart::Part::bytes(image.data.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.content_type)
                .map_err(|e| MammoError::Network(e.to_string()))?;
            form = form.part("images", part);
        }

        let response = self
            .client
            .post(self.url("/api/patients"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MammoError::Api {
                status: response.status().as_u16(),
                message: "failed to create patient".to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))?;
        Ok(Self::parse_saved_ref(&body))
    }

    async fn update_patient(&self, id: &str, payload: &PatientPayload) -> Result<SavedPatientRef> {
        info!("Updating patient {}", id);

        // 完整载荷外加id字段，与后端PUT契约一致
        let mut body = serde_json::to_value(payload)?;
        if let serde_json::Value::Object(map) = &mut body {
            map.insert("id".to_string(), serde_json::Value::String(id.to_string()));
        }

        let response = self
            .client
            .put(self.url(&format!("/api/patients/{id}")))
            .json(&body)
            .send()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(MammoError::NotFound(format!("patient {id}"))),
            status if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| MammoError::Network(e.to_string()))?;
                Ok(Self::parse_saved_ref(&body))
            }
            status => Err(MammoError::Api {
                status: status.as_u16(),
                message: format!("failed to update patient {id}"),
            }),
        }
    }

    async fn delete_patient(&self, id: i64) -> Result<()> {
        info!("Deleting patient {}", id);
        let response = self
            .client
            .delete(self.url(&format!("/api/patients/{id}")))
            .send()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(MammoError::Api {
                status: response.status().as_u16(),
                message: format!("failed to delete patient {id}"),
            })
        }
    }

    async fn get_stats(&self) -> Result<Vec<StatCard>> {
        let response = self
            .client
            .get(self.url("/api/stats"))
            .send()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MammoError::Api {
                status: response.status().as_u16(),
                message: "failed to fetch stats".to_string(),
            });
        }

        response
            .json::<Vec<StatCard>>()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))
    }

    async fn get_recent_analyses(&self) -> Result<Vec<AnalysisSummary>> {
        let response = self
            .client
            .get(self.url("/api/recent-analyses"))
            .send()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MammoError::Api {
                status: response.status().as_u16(),
                message: "failed to fetch recent analyses".to_string(),
            });
        }

        response
            .json::<Vec<AnalysisSummary>>()
            .await
            .map_err(|e| MammoError::Network(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_saved_ref_tolerates_invalid_json() {
        let parsed = HttpPatientApi::parse_saved_ref("not json at all");
        assert_eq!(parsed.id, None);
        assert_eq!(parsed.patient_id, None);
    }

    #[test]
    fn test_parse_saved_ref_reads_numeric_id() {
        let parsed = HttpPatientApi::parse_saved_ref(r#"{"id": 77, "name": "Jane Doe"}"#);
        assert_eq!(parsed.id, Some("77".to_string()));
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let api = HttpPatientApi::new(&ApiConfig {
            base_url: "http://localhost:8000/".to_string(),
            request_timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(api.url("/api/patients"), "http://localhost:8000/api/patients");
    }
}
