//! 核心数据模型定义
//!
//! 分析会话侧（草稿、影像、分析结果、保存状态）与患者名册侧
//! （患者记录、详情、分析摘要）共享的数据结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 导入后的影像数据
///
/// 导入完成后不再持有外部文件句柄，字节内容自包含。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// 分析会话中的患者草稿
#[derive(Debug, Clone, Default)]
pub struct PatientDraft {
    pub patient_id: Option<String>, // 外部分配的标识，首次保存成功前为空
    pub name: String,
    pub age: u32,
    pub scan_date: String, // ISO日期
    pub images: Vec<ImageBlob>,
}

impl PatientDraft {
    /// 去除首尾空白后的患者ID，空字符串视为未填写
    pub fn trimmed_patient_id(&self) -> Option<String> {
        self.patient_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// 导入与分析的前置校验：患者ID与姓名均非空
    pub fn identity_complete(&self) -> bool {
        self.trimmed_patient_id().is_some() && !self.name.trim().is_empty()
    }
}

/// 病灶可疑程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Suspicion {
    High,
    Moderate,
    Low,
}

/// 百分比坐标点（相对影像边界，0-100）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PercentPoint {
    pub x: f32,
    pub y: f32,
}

/// AI检出的单个感兴趣区域
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub id: String,
    pub center: PercentPoint,
    pub radii: PercentPoint,
    pub suspicion: Suspicion,
    pub confidence: f32,
    pub birads: String,
    pub description: String,
    /// 标注锚点偏移，用于避免标签互相遮挡
    pub label_offset: PercentPoint,
}

/// 处置建议
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub rationale: String,
}

/// 分析发现
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Findings {
    pub key_findings: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub disclaimer: String,
}

/// 综合评估
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub breast_density: String,
    pub birads_category: String,
    pub risk_score: f32, // 0-100
}

/// 一次分析运行的完整结果
///
/// 模拟器完成时整体替换，下一次运行前保持不可变；
/// 不直接持久化，仅派生摘要写入后端。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub overall: String,
    pub confidence: f32, // 0-100
    pub birads: String,
    pub findings: Findings,
    pub detections: Vec<Detection>,
    pub assessment: Assessment,
}

impl AnalysisResult {
    /// 固定的演示分析结果
    pub fn mock() -> Self {
        Self {
            overall: "Suspicious Area Detected".to_string(),
            confidence: 87.2,
            birads: "BI-RADS 4".to_string(),
            findings: Findings {
                key_findings: vec![
                    "Irregular mass in upper outer quadrant, left breast (12mm)".to_string(),
                    "Clustered microcalcifications in central region (5mm cluster)".to_string(),
                ],
                recommendations: vec![
                    Recommendation {
                        action: "Additional diagnostic mammographic views".to_string(),
                        rationale: "Characterize the mass margins before biopsy decision".to_string(),
                    },
                    Recommendation {
                        action: "Targeted ultrasound examination".to_string(),
                        rationale: "Differentiate solid versus cystic composition".to_string(),
                    },
                    Recommendation {
                        action: "Radiologist consultation within 2 weeks".to_string(),
                        rationale: "BI-RADS 4 findings require timely follow-up".to_string(),
                    },
                ],
                disclaimer: "AI-assisted screening output. Not a diagnosis; requires \
                             review by a qualified radiologist."
                    .to_string(),
            },
            detections: vec![
                Detection {
                    id: "det-1".to_string(),
                    center: PercentPoint { x: 50.0, y: 33.0 },
                    radii: PercentPoint { x: 9.0, y: 9.0 },
                    suspicion: Suspicion::High,
                    confidence: 87.0,
                    birads: "BI-RADS 4".to_string(),
                    description: "Mass, upper outer quadrant, left breast".to_string(),
                    label_offset: PercentPoint { x: 0.0, y: -8.0 },
                },
                Detection {
                    id: "det-2".to_string(),
                    center: PercentPoint { x: 33.0, y: 50.0 },
                    radii: PercentPoint { x: 6.0, y: 6.0 },
                    suspicion: Suspicion::Moderate,
                    confidence: 72.0,
                    birads: "BI-RADS 3".to_string(),
                    description: "Calcification cluster, central region, left breast".to_string(),
                    label_offset: PercentPoint { x: 0.0, y: 10.0 },
                },
            ],
            assessment: Assessment {
                breast_density: "Heterogeneously dense (C)".to_string(),
                birads_category: "4".to_string(),
                risk_score: 68.0,
            },
        }
    }

    /// 尚未生成分析时的占位摘要
    pub fn not_yet_generated() -> Self {
        Self {
            overall: "Analysis not yet generated".to_string(),
            confidence: 0.0,
            birads: "N/A".to_string(),
            findings: Findings {
                key_findings: Vec::new(),
                recommendations: Vec::new(),
                disclaimer: "No saved analysis available for this patient.".to_string(),
            },
            detections: Vec::new(),
            assessment: Assessment {
                breast_density: "Unknown".to_string(),
                birads_category: "N/A".to_string(),
                risk_score: 0.0,
            },
        }
    }

    /// 由历史分析摘要还原的展示结果
    pub fn from_summary(summary: &AnalysisSummary) -> Self {
        let mut result = Self::not_yet_generated();
        result.overall = summary.result.clone();
        result.confidence = summary.confidence;
        result.findings.disclaimer =
            format!("Restored from saved analysis dated {}.", summary.date.date_naive());
        result
    }
}

/// 会话保存状态
///
/// 不变式：`analysis_saved == true` 时，`saved_payload_signature`
/// 必须等于最近一次成功保存所发送载荷的签名。
#[derive(Debug, Clone, Default)]
pub struct SaveState {
    pub analysis_saved: bool,
    pub saved_payload_signature: Option<String>,
    pub saved_patient_id: Option<String>,
}

impl SaveState {
    /// 清空保存状态（重新导入或返回上传页时调用）
    pub fn clear(&mut self) {
        self.analysis_saved = false;
        self.saved_payload_signature = None;
        self.saved_patient_id = None;
    }
}

/// 发往后端的患者载荷
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientPayload {
    pub name: String,
    pub age: u32,
    pub last_scan: String,
    pub total_scans: u32,
    pub status: String,
    pub risk_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

/// 保存响应中的患者标识（宽容解析）
///
/// 响应体缺失或非法JSON时两个字段均为空，由调用方按
/// 优先级回退推断实际ID。
#[derive(Debug, Clone, Default)]
pub struct SavedPatientRef {
    pub id: Option<String>,
    pub patient_id: Option<String>,
}

impl SavedPatientRef {
    /// 从任意JSON值中提取 `id` / `patientId` 字段，数字与字符串均接受
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self {
            id: Self::field_as_string(value, "id"),
            patient_id: Self::field_as_string(value, "patientId"),
        }
    }

    fn field_as_string(value: &serde_json::Value, key: &str) -> Option<String> {
        match value.get(key) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                Some(s.trim().to_string())
            }
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn deserialize_numeric_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    // 后端正常返回数字ID，但接收时统一强制为数字，字符串形式也接受
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Text(String),
    }

    match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(n) => Ok(n),
        IdRepr::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid patient id: {s}"))),
    }
}

/// 名册侧患者记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    #[serde(deserialize_with = "deserialize_numeric_id")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    pub last_scan: String,
    #[serde(default)]
    pub total_scans: Option<u32>,
    pub status: String,
    pub risk_level: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// 历史分析摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub result: String,
    pub confidence: f32,
    pub status: String,
}

/// 后端存储的乳腺影像引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MammogramImage {
    pub id: i64,
    pub file_path: String,
    pub uploaded_at: DateTime<Utc>,
}

/// 单个患者的完整详情
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetail {
    #[serde(deserialize_with = "deserialize_numeric_id")]
    pub id: i64,
    pub name: String,
    pub age: u32,
    pub last_scan: String,
    pub total_scans: u32,
    pub status: String,
    pub risk_level: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub analyses: Vec<AnalysisSummary>,
    #[serde(default)]
    pub images: Vec<MammogramImage>,
}

/// 仪表盘统计卡片
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatCard {
    pub title: String,
    pub value: String,
    pub change: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_patient_id() {
        let mut draft = PatientDraft::default();
        assert_eq!(draft.trimmed_patient_id(), None);

        draft.patient_id = Some("   ".to_string());
        assert_eq!(draft.trimmed_patient_id(), None);

        draft.patient_id = Some(" PT-0042 ".to_string());
        assert_eq!(draft.trimmed_patient_id(), Some("PT-0042".to_string()));
    }

    #[test]
    fn test_identity_complete() {
        let mut draft = PatientDraft {
            patient_id: Some("PT-1".to_string()),
            name: "Jane Doe".to_string(),
            ..Default::default()
        };
        assert!(draft.identity_complete());

        draft.name = " ".to_string();
        assert!(!draft.identity_complete());
    }

    #[test]
    fn test_saved_patient_ref_accepts_number_and_string() {
        let value = serde_json::json!({"id": 77, "patientId": "PT-77"});
        let parsed = SavedPatientRef::from_value(&value);
        assert_eq!(parsed.id, Some("77".to_string()));
        assert_eq!(parsed.patient_id, Some("PT-77".to_string()));

        let empty = SavedPatientRef::from_value(&serde_json::json!({}));
        assert_eq!(empty.id, None);
        assert_eq!(empty.patient_id, None);
    }

    #[test]
    fn test_patient_record_id_coercion() {
        let record: PatientRecord = serde_json::from_str(
            r#"{"id": "12", "name": "Sarah Johnson", "lastScan": "2025-11-12",
                "status": "Active", "riskLevel": "Low"}"#,
        )
        .unwrap();
        assert_eq!(record.id, 12);
        assert_eq!(record.total_scans, None);
    }
}
