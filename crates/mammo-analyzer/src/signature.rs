//! 载荷签名引擎
//!
//! 计算保存载荷的规范化签名，用于判断当前会话状态是否偏离
//! 最近一次成功保存的内容（脏状态检测）。签名仅用于内容相等性
//! 比较，不承担任何密码学职责。

use mammo_core::{ImageBlob, PatientDraft, PatientPayload};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// 签名中的单个影像描述
///
/// 影像字节不进入签名，文件名加长度足以区分一次会话内的
/// 影像序列变化（增删、重排、替换）。
#[derive(Serialize)]
struct ImageDescriptor<'a> {
    file_name: &'a str,
    len: usize,
}

/// 规范化签名输入
///
/// 字段按声明顺序序列化，serde_json输出对同一输入稳定，
/// 这是签名确定性的基础。
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInput<'a> {
    name: &'a str,
    age: u32,
    last_scan: &'a str,
    total_scans: u32,
    status: &'a str,
    risk_level: &'a str,
    /// 用户填写的患者ID；编辑该字段同样要触发脏状态
    patient_id: &'a str,
    effective_id: &'a str,
    images: Vec<ImageDescriptor<'a>>,
}

/// 由草稿构建发往后端的载荷
///
/// totalScans固定为1，status与riskLevel由后续流程更新；
/// 患者ID去除空白，空串视为未填写。
pub fn outgoing_payload(draft: &PatientDraft) -> PatientPayload {
    PatientPayload {
        name: draft.name.trim().to_string(),
        age: draft.age,
        last_scan: draft.scan_date.clone(),
        total_scans: 1,
        status: "Active".to_string(),
        risk_level: "Unknown".to_string(),
        patient_id: draft.trimmed_patient_id(),
    }
}

/// 计算载荷签名
///
/// `effective_id` 为空时以空串参与计算，保证"未填ID"与"空ID"
/// 产生同一签名。
pub fn signature(
    payload: &PatientPayload,
    images: &[ImageBlob],
    effective_id: Option<&str>,
) -> String {
    let input = SignatureInput {
        name: &payload.name,
        age: payload.age,
        last_scan: &payload.last_scan,
        total_scans: payload.total_scans,
        status: &payload.status,
        risk_level: &payload.risk_level,
        patient_id: payload.patient_id.as_deref().unwrap_or(""),
        effective_id: effective_id.unwrap_or(""),
        images: images
            .iter()
            .map(|img| ImageDescriptor {
                file_name: &img.file_name,
                len: img.data.len(),
            })
            .collect(),
    };

    // SignatureInput字段全部可序列化，序列化不会失败
    let canonical = serde_json::to_string(&input).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
