//! 会话状态存储
//!
//! 持有当前患者草稿、影像序列、分析结果与保存状态，并在每次
//! 字段变更后执行脏状态检测。草稿归活动会话独占，不跨会话共享。

use mammo_core::config::AnalyzerConfig;
use mammo_core::{AnalysisResult, ImageBlob, PatientDraft, SaveState};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::signature::{outgoing_payload, signature};
use crate::simulator::AnalysisPhase;

/// 结果面板的选中页签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultTab {
    #[default]
    Summary,
    Findings,
    Recommendations,
}

/// 需要标红的身份字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    PatientId,
    Name,
}

/// 临时提示消息，超过存活时间后自动消失
#[derive(Debug, Clone)]
pub struct Notice {
    pub text: String,
    expires_at: Option<Instant>,
}

/// 从名册详情页带入分析器的会话种子
///
/// 仅作为一次性导航状态传递，消费后即被替换，不做持久化。
#[derive(Debug, Clone)]
pub struct AnalyzerSeed {
    pub name: String,
    pub age: u32,
    pub image_urls: Vec<String>,
    pub summary: AnalysisResult,
}

/// 分析会话状态
#[derive(Debug)]
pub struct SessionState {
    pub(crate) config: AnalyzerConfig,
    pub(crate) draft: PatientDraft,
    pub(crate) analysis: Option<AnalysisResult>,
    pub(crate) save_state: SaveState,
    pub(crate) phase: AnalysisPhase,
    pub(crate) progress: u8,
    pub(crate) is_saving: bool,
    pub(crate) save_message: Option<String>,
    pub(crate) save_error: Option<String>,
    active_image_index: usize,
    active_detection: Option<String>,
    active_tab: ResultTab,
    /// 由名册种子带入的远端影像URL，不参与签名
    remote_images: Vec<String>,
    notice: Option<Notice>,
    invalid_fields: Vec<IdentityField>,
    /// 会话代数，每次重置递增；过期的模拟器tick据此失效
    pub(crate) generation: u64,
}

impl SessionState {
    /// 创建空会话
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            draft: PatientDraft::default(),
            analysis: None,
            save_state: SaveState::default(),
            phase: AnalysisPhase::Idle,
            progress: 0,
            is_saving: false,
            save_message: None,
            save_error: None,
            active_image_index: 0,
            active_detection: None,
            active_tab: ResultTab::default(),
            remote_images: Vec::new(),
            notice: None,
            invalid_fields: Vec::new(),
            generation: 0,
        }
    }

    // ---- 只读访问 ----

    pub fn draft(&self) -> &PatientDraft {
        &self.draft
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn save_state(&self) -> &SaveState {
        &self.save_state
    }

    pub fn phase(&self) -> AnalysisPhase {
        self.phase
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_analyzing(&self) -> bool {
        self.phase == AnalysisPhase::Running
    }

    pub fn analysis_complete(&self) -> bool {
        self.phase == AnalysisPhase::Complete
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    pub fn active_image_index(&self) -> usize {
        self.active_image_index
    }

    pub fn active_tab(&self) -> ResultTab {
        self.active_tab
    }

    pub fn active_detection(&self) -> Option<&str> {
        self.active_detection.as_deref()
    }

    pub fn remote_images(&self) -> &[String] {
        &self.remote_images
    }

    pub fn save_message(&self) -> Option<&str> {
        self.save_message.as_deref()
    }

    pub fn save_error(&self) -> Option<&str> {
        self.save_error.as_deref()
    }

    pub fn invalid_fields(&self) -> &[IdentityField] {
        &self.invalid_fields
    }

    /// 当前有效的提示消息，过期即不可见
    pub fn notice(&self) -> Option<&str> {
        match &self.notice {
            Some(n) if n.expires_at.map_or(true, |at| Instant::now() < at) => Some(&n.text),
            _ => None,
        }
    }

    // ---- 字段编辑（触发脏状态检测） ----

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.draft.name = name.into();
        self.refresh_dirty_state();
    }

    pub fn set_age(&mut self, age: u32) {
        self.draft.age = age;
        self.refresh_dirty_state();
    }

    pub fn set_scan_date(&mut self, scan_date: impl Into<String>) {
        self.draft.scan_date = scan_date.into();
        self.refresh_dirty_state();
    }

    pub fn set_patient_id(&mut self, patient_id: Option<String>) {
        self.draft.patient_id = patient_id;
        self.refresh_dirty_state();
    }

    // ---- 视图选择（不触发脏状态检测） ----

    pub fn select_image(&mut self, index: usize) {
        if index < self.draft.images.len().max(self.remote_images.len()) {
            self.active_image_index = index;
        }
    }

    pub fn select_tab(&mut self, tab: ResultTab) {
        self.active_tab = tab;
    }

    pub fn select_detection(&mut self, detection_id: Option<String>) {
        self.active_detection = detection_id;
    }

    // ---- 提示消息 ----

    pub(crate) fn set_transient_notice(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            expires_at: Some(Instant::now() + Duration::from_millis(self.config.notice_ttl_ms)),
        });
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    pub(crate) fn flag_missing_identity(&mut self) {
        self.invalid_fields.clear();
        if self.draft.trimmed_patient_id().is_none() {
            self.invalid_fields.push(IdentityField::PatientId);
        }
        if self.draft.name.trim().is_empty() {
            self.invalid_fields.push(IdentityField::Name);
        }
    }

    // ---- 影像序列与会话重置 ----

    /// 原子替换影像序列并重置依赖状态
    ///
    /// 分析结果、保存状态、保存消息一并清空，选中影像回到首张。
    pub(crate) fn replace_images(&mut self, images: Vec<ImageBlob>) {
        self.draft.images = images;
        self.analysis = None;
        self.save_state.clear();
        self.phase = AnalysisPhase::Idle;
        self.progress = 0;
        self.active_image_index = 0;
        self.active_detection = None;
        self.save_message = None;
        self.save_error = None;
        self.notice = None;
        self.invalid_fields.clear();
        self.generation += 1;
    }

    /// 返回上传页：清空影像与全部分析状态
    pub fn reset_to_upload(&mut self) {
        self.draft.images.clear();
        self.remote_images.clear();
        self.analysis = None;
        self.save_state.clear();
        self.phase = AnalysisPhase::Idle;
        self.progress = 0;
        self.active_image_index = 0;
        self.active_detection = None;
        self.active_tab = ResultTab::default();
        self.save_message = None;
        self.save_error = None;
        self.notice = None;
        self.invalid_fields.clear();
        self.generation += 1;
    }

    /// 应用来自名册的会话种子，整体替换当前会话内容
    pub fn apply_seed(&mut self, seed: AnalyzerSeed) {
        self.reset_to_upload();
        self.draft.name = seed.name;
        self.draft.age = seed.age;
        self.remote_images = seed.image_urls;
        // 历史分析直接进入完成态展示
        self.analysis = Some(seed.summary);
        self.phase = AnalysisPhase::Complete;
        self.progress = 100;
    }

    // ---- 脏状态检测 ----

    /// 保存后任一载荷字段变化时，重新比对签名并撤销"已保存"标记
    ///
    /// 分析运行中或未完成时不触发。
    pub(crate) fn refresh_dirty_state(&mut self) {
        if !self.analysis_complete() || !self.save_state.analysis_saved {
            return;
        }

        let current = self.current_signature();
        if Some(&current) != self.save_state.saved_payload_signature.as_ref() {
            debug!("Draft diverged from last saved payload, clearing saved flag");
            self.save_state.analysis_saved = false;
            self.save_state.saved_payload_signature = None;
            self.save_message = None;
            self.save_error = None;
        }
    }

    /// 当前草稿的载荷签名
    pub(crate) fn current_signature(&self) -> String {
        let payload = outgoing_payload(&self.draft);
        let effective_id = self
            .save_state
            .saved_patient_id
            .clone()
            .or_else(|| payload.patient_id.clone());
        signature(&payload, &self.draft.images, effective_id.as_deref())
    }
}
