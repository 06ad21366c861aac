//! 测试辅助：内存版患者API
//!
//! 供各crate的单元测试注入，记录全部调用并可注入失败场景，
//! 测试不触网。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use mammo_core::{
    AnalysisSummary, ImageBlob, MammoError, PatientDetail, PatientPayload, PatientRecord, Result,
    SavedPatientRef, StatCard,
};

use crate::api::PatientApi;

/// 记录的一次API调用
#[derive(Debug, Clone)]
pub enum RecordedCall {
    List,
    Get(i64),
    Create {
        payload: PatientPayload,
        image_count: usize,
    },
    Update {
        id: String,
        payload: PatientPayload,
    },
    Delete(i64),
}

/// 内存实现
pub struct InMemoryPatientApi {
    next_id: AtomicI64,
    records: Mutex<Vec<PatientRecord>>,
    details: Mutex<HashMap<i64, PatientDetail>>,
    calls: Mutex<Vec<RecordedCall>>,
    update_returns_not_found: AtomicBool,
    fail_creates: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryPatientApi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(77),
            records: Mutex::new(Vec::new()),
            details: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            update_returns_not_found: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// 预置名册记录
    pub fn with_roster(records: Vec<PatientRecord>) -> Self {
        let api = Self::new();
        *api.records.lock().unwrap() = records;
        api
    }

    /// 预置患者详情
    pub fn insert_detail(&self, detail: PatientDetail) {
        self.details.lock().unwrap().insert(detail.id, detail);
    }

    /// 之后的更新请求一律返回404（模拟服务端丢失记录）
    pub fn set_update_not_found(&self, value: bool) {
        self.update_returns_not_found.store(value, Ordering::SeqCst);
    }

    /// 之后的创建请求一律失败
    pub fn set_fail_creates(&self, value: bool) {
        self.fail_creates.store(value, Ordering::SeqCst);
    }

    /// 之后的删除请求一律失败
    pub fn set_fail_deletes(&self, value: bool) {
        self.fail_deletes.store(value, Ordering::SeqCst);
    }

    /// 已记录的全部调用
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// 当前名册快照
    pub fn roster_snapshot(&self) -> Vec<PatientRecord> {
        self.records.lock().unwrap().clone()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for InMemoryPatientApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatientApi for InMemoryPatientApi {
    async fn list_patients(&self) -> Result<Vec<PatientRecord>> {
        self.record(RecordedCall::List);
        Ok(self.records.lock().unwrap().clone())
    }

    async fn get_patient(&self, id: i64) -> Result<PatientDetail> {
        self.record(RecordedCall::Get(id));
        self.details
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| MammoError::NotFound(format!("patient {id}")))
    }

    async fn create_patient(
        &self,
        payload: &PatientPayload,
        images: &[ImageBlob],
    ) -> Result<SavedPatientRef> {
        self.record(RecordedCall::Create {
            payload: payload.clone(),
            image_count: images.len(),
        });

        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(MammoError::Api {
                status: 500,
                message: "failed to create patient".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push(PatientRecord {
            id,
            name: payload.name.clone(),
            age: Some(payload.age),
            last_scan: payload.last_scan.clone(),
            total_scans: Some(payload.total_scans),
            status: payload.status.clone(),
            risk_level: payload.risk_level.clone(),
            avatar: None,
        });

        Ok(SavedPatientRef {
            id: Some(id.to_string()),
            patient_id: None,
        })
    }

    async fn update_patient(&self, id: &str, payload: &PatientPayload) -> Result<SavedPatientRef> {
        self.record(RecordedCall::Update {
            id: id.to_string(),
            payload: payload.clone(),
        });

        if self.update_returns_not_found.load(Ordering::SeqCst) {
            return Err(MammoError::NotFound(format!("patient {id}")));
        }

        // 与后端一致：未知ID的更新返回404，而不是悄悄成功
        let numeric_id = id.trim().parse::<i64>().ok();
        let mut records = self.records.lock().unwrap();
        match numeric_id.and_then(|n| records.iter_mut().find(|r| r.id == n)) {
            Some(record) => {
                record.name = payload.name.clone();
                record.age = Some(payload.age);
                record.last_scan = payload.last_scan.clone();
                record.status = payload.status.clone();
                record.risk_level = payload.risk_level.clone();

                Ok(SavedPatientRef {
                    id: Some(id.to_string()),
                    patient_id: None,
                })
            }
            None => Err(MammoError::NotFound(format!("patient {id}"))),
        }
    }

    async fn delete_patient(&self, id: i64) -> Result<()> {
        self.record(RecordedCall::Delete(id));

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(MammoError::Api {
                status: 500,
                message: format!("failed to delete patient {id}"),
            });
        }

        self.records.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn get_stats(&self) -> Result<Vec<StatCard>> {
        Ok(vec![StatCard {
            title: "Total Scans".to_string(),
            value: "1,247".to_string(),
            change: "+12.5%".to_string(),
        }])
    }

    async fn get_recent_analyses(&self) -> Result<Vec<AnalysisSummary>> {
        Ok(vec![AnalysisSummary {
            id: 1,
            date: Utc::now(),
            result: "Normal".to_string(),
            confidence: 98.5,
            status: "Completed".to_string(),
        }])
    }
}


/// 名册测试夹具（与演示数据同源）
pub fn sample_roster() -> Vec<PatientRecord> {
    let entries = [
        (2847, "Sarah Johnson", 52, "2025-11-12", 5, "Active", "Low"),
        (2846, "Maria Garcia", 48, "2025-11-12", 3, "Pending Review", "Moderate"),
        (2845, "Jennifer Lee", 61, "2025-11-11", 8, "Active", "Low"),
        (2844, "Patricia Martinez", 45, "2025-11-11", 2, "Follow-up Required", "High"),
        (2843, "Linda Brown", 58, "2025-11-10", 6, "Active", "Low"),
        (2842, "Elizabeth Davis", 54, "2025-11-09", 4, "Active", "Moderate"),
    ];

    entries
        .into_iter()
        .map(
            |(id, name, age, last_scan, total_scans, status, risk_level)| PatientRecord {
                id,
                name: name.to_string(),
                age: Some(age),
                last_scan: last_scan.to_string(),
                total_scans: Some(total_scans),
                status: status.to_string(),
                risk_level: risk_level.to_string(),
                avatar: None,
            },
        )
        .collect()
}
