//! 持久化网关
//!
//! 决定对患者资源执行创建（POST）还是更新（PUT），更新遇到404
//! 时透明降级为创建，并把服务端分配的标识回填到本地会话。
//! 同一会话同时只允许一次保存在途，并发请求被忽略而非排队。

use mammo_client::PatientApi;
use mammo_core::events::{EventBus, RosterEvent};
use mammo_core::{MammoError, PatientDraft, PatientPayload, Result, SavedPatientRef};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::session::SessionState;
use crate::signature::{outgoing_payload, signature};

/// 保存失败时面向用户的统一提示
pub const SAVE_FAILED_MESSAGE: &str = "Unable to save analysis. Please try again.";

/// 一次成功保存的结果
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// 最终生效的患者标识（见回退优先级）
    pub assigned_id: Option<String>,
    /// true表示走的是更新路径（PUT成功）
    pub updated: bool,
    pub message: String,
}

/// 持久化网关
pub struct PersistenceGateway {
    api: Arc<dyn PatientApi>,
    bus: EventBus,
}

impl PersistenceGateway {
    pub fn new(api: Arc<dyn PatientApi>, bus: EventBus) -> Self {
        Self { api, bus }
    }

    /// 保存当前会话的分析到患者记录
    ///
    /// 返回 `Ok(None)` 表示已有保存在途，本次请求被忽略。
    /// 只有确认成功的响应才会改写保存状态；失败路径写入
    /// 用户可见错误后原样返回。
    pub async fn save(&self, state: &Arc<Mutex<SessionState>>) -> Result<Option<SaveOutcome>> {
        // 快照草稿并上并发保护
        let (draft, saved_patient_id) = {
            let mut session = state.lock().await;
            if session.is_saving {
                debug!("Save already in flight, ignoring request");
                return Ok(None);
            }
            if !session.analysis_complete() {
                return Err(MammoError::Validation(
                    "analysis must complete before saving".to_string(),
                ));
            }
            session.is_saving = true;
            session.save_error = None;
            (
                session.draft.clone(),
                session.save_state.saved_patient_id.clone(),
            )
        };

        match self.perform_save(&draft, saved_patient_id).await {
            Ok((saved_ref, updated, payload, effective_id)) => {
                let outcome = self
                    .finalize(state, &draft, saved_ref, updated, payload, effective_id)
                    .await;
                // 通知名册刷新，事件不携带数据
                self.bus.publish(RosterEvent::PatientCreated);
                Ok(Some(outcome))
            }
            Err(e) => {
                let mut session = state.lock().await;
                session.is_saving = false;
                session.save_error = Some(SAVE_FAILED_MESSAGE.to_string());
                Err(e)
            }
        }
    }

    /// 创建或更新的分支决策与执行
    ///
    /// 有效ID = 上次保存的ID，否则取用户填写的（去空白）ID；
    /// 非空走更新，否则走携带影像的multipart创建。
    async fn perform_save(
        &self,
        draft: &PatientDraft,
        saved_patient_id: Option<String>,
    ) -> Result<(SavedPatientRef, bool, PatientPayload, Option<String>)> {
        let payload = outgoing_payload(draft);
        let effective_id = saved_patient_id.or_else(|| payload.patient_id.clone());

        if let Some(id) = effective_id.as_deref() {
            match self.api.update_patient(id, &payload).await {
                Ok(saved_ref) => return Ok((saved_ref, true, payload, effective_id)),
                Err(MammoError::NotFound(_)) => {
                    // 服务端丢失了记录或ID已失效：换一种操作重试，而不是原样重试
                    warn!("Patient {} missing on server, falling back to create", id);
                    let saved_ref = self.api.create_patient(&payload, &draft.images).await?;
                    return Ok((saved_ref, false, payload, effective_id));
                }
                Err(e) => return Err(e),
            }
        }

        let saved_ref = self.api.create_patient(&payload, &draft.images).await?;
        Ok((saved_ref, false, payload, effective_id))
    }

    /// 成功后的标识回填与保存状态落账
    async fn finalize(
        &self,
        state: &Arc<Mutex<SessionState>>,
        draft: &PatientDraft,
        saved_ref: SavedPatientRef,
        updated: bool,
        payload: PatientPayload,
        effective_id: Option<String>,
    ) -> SaveOutcome {
        // 标识回退优先级：响应id > 响应patientId > 请求所用有效ID > 用户填写的ID
        let typed_id = payload.patient_id.clone();
        let assigned_id = saved_ref
            .id
            .or(saved_ref.patient_id)
            .or(effective_id)
            .or_else(|| typed_id.clone());

        let message = if updated {
            "Patient record updated.".to_string()
        } else {
            "Analysis saved to patient record.".to_string()
        };

        let mut session = state.lock().await;

        // 用户未填ID时，把分配的ID采纳进可编辑字段；
        // 存档签名随之使用采纳后的ID，保证保存刚结束时不判脏
        let mut saved_payload = payload;
        if typed_id.is_none() {
            session.draft.patient_id = assigned_id.clone();
            saved_payload.patient_id = assigned_id.clone();
        }

        session.save_state.saved_patient_id = assigned_id.clone();
        session.save_state.saved_payload_signature = Some(signature(
            &saved_payload,
            &draft.images,
            assigned_id.as_deref(),
        ));
        session.save_state.analysis_saved = true;
        session.save_message = Some(message.clone());
        session.save_error = None;
        session.is_saving = false;

        // 保存期间若有字段被改动，立即重新比对签名
        session.refresh_dirty_state();

        info!(
            "Save finished, patient id {:?}, path: {}",
            assigned_id,
            if updated { "update" } else { "create" }
        );

        SaveOutcome {
            assigned_id,
            updated,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::AnalysisPhase;
    use mammo_client::testing::{InMemoryPatientApi, RecordedCall};
    use mammo_core::config::AnalyzerConfig;
    use mammo_core::{AnalysisResult, ImageBlob};

    fn completed_session(patient_id: Option<&str>) -> Arc<Mutex<SessionState>> {
        let mut session = SessionState::new(AnalyzerConfig::default());
        session.draft.patient_id = patient_id.map(str::to_string);
        session.draft.name = "Jane Doe".to_string();
        session.draft.age = 58;
        session.draft.scan_date = "2025-11-12".to_string();
        session.draft.images = vec![ImageBlob {
            file_name: "scan1.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        }];
        session.analysis = Some(AnalysisResult::mock());
        session.phase = AnalysisPhase::Complete;
        session.progress = 100;
        Arc::new(Mutex::new(session))
    }

    fn gateway(api: &Arc<InMemoryPatientApi>) -> PersistenceGateway {
        PersistenceGateway::new(api.clone() as Arc<dyn PatientApi>, EventBus::default())
    }

    #[tokio::test]
    async fn test_first_save_creates_and_adopts_assigned_id() {
        let api = Arc::new(InMemoryPatientApi::new());
        let state = completed_session(None);

        let outcome = gateway(&api).save(&state).await.unwrap().unwrap();

        assert_eq!(outcome.assigned_id, Some("77".to_string()));
        assert!(!outcome.updated);

        let session = state.lock().await;
        assert_eq!(session.save_state().saved_patient_id, Some("77".to_string()));
        // 用户未填ID，分配的ID被采纳进可编辑字段
        assert_eq!(session.draft().patient_id, Some("77".to_string()));
        assert!(session.save_state().analysis_saved);
        assert!(!session.is_saving());

        assert!(matches!(api.calls()[..], [RecordedCall::Create { .. }]));
    }

    #[tokio::test]
    async fn test_second_save_uses_update_path() {
        let api = Arc::new(InMemoryPatientApi::new());
        let state = completed_session(None);
        let gw = gateway(&api);

        gw.save(&state).await.unwrap().unwrap();
        let outcome = gw.save(&state).await.unwrap().unwrap();

        assert!(outcome.updated);
        assert_eq!(outcome.assigned_id, Some("77".to_string()));

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            RecordedCall::Update { id, .. } => assert_eq!(id, "77"),
            other => panic!("expected update call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_put_not_found_falls_back_to_single_create() {
        let api = Arc::new(InMemoryPatientApi::new());
        api.set_update_not_found(true);
        let state = completed_session(Some("42"));

        let outcome = gateway(&api).save(&state).await.unwrap().unwrap();

        // 降级为创建：消息按创建路径措辞
        assert!(!outcome.updated);

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], RecordedCall::Update { .. }));
        match &calls[1] {
            RecordedCall::Create {
                payload,
                image_count,
            } => {
                // 标量字段原样保留，影像随multipart一并发出
                assert_eq!(payload.name, "Jane Doe");
                assert_eq!(payload.age, 58);
                assert_eq!(payload.last_scan, "2025-11-12");
                assert_eq!(payload.total_scans, 1);
                assert_eq!(payload.status, "Active");
                assert_eq!(payload.risk_level, "Unknown");
                assert_eq!(*image_count, 1);
            }
            other => panic!("expected create call, got {:?}", other),
        }

        // 用户填写过ID，可编辑字段不被覆盖
        let session = state.lock().await;
        assert_eq!(session.draft().patient_id, Some("42".to_string()));
        assert_eq!(session.save_state().saved_patient_id, Some("77".to_string()));
    }

    #[tokio::test]
    async fn test_patient_id_edit_after_save_reenables_save() {
        let api = Arc::new(InMemoryPatientApi::new());
        let state = completed_session(None);

        gateway(&api).save(&state).await.unwrap().unwrap();

        let mut session = state.lock().await;
        assert!(session.save_state().analysis_saved);

        // 改动患者ID字段必须撤销"已保存"标记，保存入口重新可用
        session.set_patient_id(Some("PT-9999".to_string()));
        assert!(!session.save_state().analysis_saved);
        assert_eq!(session.save_state().saved_payload_signature, None);
        // 已保存的服务端ID保留，下一次保存仍走更新路径
        assert_eq!(session.save_state().saved_patient_id, Some("77".to_string()));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_save_state_untouched() {
        let api = Arc::new(InMemoryPatientApi::new());
        api.set_fail_creates(true);
        let state = completed_session(None);

        let result = gateway(&api).save(&state).await;
        assert!(result.is_err());

        let session = state.lock().await;
        assert!(!session.save_state().analysis_saved);
        assert_eq!(session.save_state().saved_patient_id, None);
        assert_eq!(session.save_error(), Some(SAVE_FAILED_MESSAGE));
        assert!(!session.is_saving());
    }

    #[tokio::test]
    async fn test_concurrent_save_is_ignored() {
        let api = Arc::new(InMemoryPatientApi::new());
        let state = completed_session(None);
        state.lock().await.is_saving = true;

        let outcome = gateway(&api).save(&state).await.unwrap();

        assert!(outcome.is_none());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_save_requires_completed_analysis() {
        let api = Arc::new(InMemoryPatientApi::new());
        let state = completed_session(None);
        state.lock().await.phase = AnalysisPhase::Idle;

        let result = gateway(&api).save(&state).await;
        assert!(matches!(result, Err(MammoError::Validation(_))));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_successful_save_publishes_roster_event() {
        let api = Arc::new(InMemoryPatientApi::new());
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        let gw = PersistenceGateway::new(api.clone() as Arc<dyn PatientApi>, bus);
        let state = completed_session(None);

        gw.save(&state).await.unwrap().unwrap();

        assert_eq!(
            receiver.recv().await.unwrap(),
            RosterEvent::PatientCreated
        );
    }
}
