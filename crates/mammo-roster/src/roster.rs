//! 患者名册管理
//!
//! 名册独立于分析器会话：过滤、分页、多选与批量删除都只作用于
//! 本地名册状态，数据变更通过API往返，刷新由事件总线驱动。

use mammo_client::PatientApi;
use mammo_core::events::EventBus;
use mammo_core::{MammoError, PatientRecord, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::detail::{DetailLoader, PatientDetailView};

/// 可选的每页条数
pub const PAGE_SIZE_CHOICES: [usize; 3] = [5, 10, 20];

/// 批量删除所需的确认文本（不区分大小写）
pub const DELETE_CONFIRMATION: &str = "delete";

/// 批量删除失败时的统一提示
pub const BULK_DELETE_FAILED_MESSAGE: &str = "Failed to delete the selected patients.";

/// 名册状态
#[derive(Debug, Default)]
pub struct RosterState {
    records: Vec<PatientRecord>,
    search_term: String,
    page_size: usize,
    current_page: usize,
    selected: HashSet<i64>,
    confirmation_text: String,
    delete_error: Option<String>,
    /// 当前打开的患者详情，加载成功后整体替换
    detail: Option<PatientDetailView>,
}

impl RosterState {
    pub fn new() -> Self {
        Self {
            page_size: PAGE_SIZE_CHOICES[1],
            current_page: 1,
            ..Default::default()
        }
    }

    // ---- 过滤 ----

    /// 设置搜索词并回到第一页
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
        self.current_page = 1;
        self.clamp_page();
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// 当前过滤结果：姓名不区分大小写子串匹配，或数字ID子串匹配
    pub fn filtered(&self) -> Vec<&PatientRecord> {
        let term = self.search_term.trim().to_lowercase();
        self.records
            .iter()
            .filter(|record| {
                term.is_empty()
                    || record.name.to_lowercase().contains(&term)
                    || record.id.to_string().contains(&term)
            })
            .collect()
    }

    // ---- 分页 ----

    /// 设置每页条数；仅接受预设选项，并回到第一页
    pub fn set_page_size(&mut self, size: usize) {
        if !PAGE_SIZE_CHOICES.contains(&size) {
            warn!("Ignoring unsupported page size {}", size);
            return;
        }
        self.page_size = size;
        self.current_page = 1;
        self.clamp_page();
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 总页数；空结果视为1页
    pub fn total_pages(&self) -> usize {
        let count = self.filtered().len();
        if count == 0 {
            1
        } else {
            count.div_ceil(self.page_size)
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// 跳转页码，越界时收敛到合法区间
    pub fn go_to_page(&mut self, page: usize) {
        self.current_page = page.max(1);
        self.clamp_page();
    }

    /// 当前页的记录
    pub fn page_items(&self) -> Vec<&PatientRecord> {
        let filtered = self.filtered();
        let start = (self.current_page - 1) * self.page_size;
        filtered
            .into_iter()
            .skip(start)
            .take(self.page_size)
            .collect()
    }

    fn clamp_page(&mut self) {
        let total = self.total_pages();
        self.current_page = self.current_page.clamp(1, total);
    }

    // ---- 多选 ----

    pub fn selected(&self) -> &HashSet<i64> {
        &self.selected
    }

    pub fn toggle_selected(&mut self, id: i64) {
        if !self.selected.insert(id) {
            self.selected.remove(&id);
        }
    }

    /// 全选开关：当前过滤结果全部已选则清空，否则全选过滤结果
    pub fn toggle_select_all(&mut self) {
        let filtered_ids: HashSet<i64> = self.filtered().iter().map(|r| r.id).collect();
        if !filtered_ids.is_empty() && filtered_ids.is_subset(&self.selected) {
            self.selected.clear();
        } else {
            self.selected = filtered_ids;
        }
    }

    // ---- 删除确认 ----

    pub fn set_confirmation_text(&mut self, text: impl Into<String>) {
        self.confirmation_text = text.into();
    }

    /// 破坏性操作的启用条件：确认文本精确匹配（仅忽略大小写）
    /// 且至少选中一条；首尾空白也算不匹配
    pub fn can_confirm_delete(&self) -> bool {
        self.confirmation_text.eq_ignore_ascii_case(DELETE_CONFIRMATION)
            && !self.selected.is_empty()
    }

    pub fn delete_error(&self) -> Option<&str> {
        self.delete_error.as_deref()
    }

    // ---- 数据刷新 ----

    /// 整体替换名册并修剪选中集与页码
    ///
    /// 刷新后已消失的记录静默退出选中集。
    pub fn apply_roster(&mut self, records: Vec<PatientRecord>) {
        let surviving: HashSet<i64> = records.iter().map(|r| r.id).collect();
        self.selected.retain(|id| surviving.contains(id));
        self.records = records;
        self.clamp_page();
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    pub fn detail(&self) -> Option<&PatientDetailView> {
        self.detail.as_ref()
    }
}

/// 名册管理器
pub struct RosterManager {
    api: Arc<dyn PatientApi>,
    loader: DetailLoader,
    state: Arc<Mutex<RosterState>>,
}

impl RosterManager {
    pub fn new(api: Arc<dyn PatientApi>, loader: DetailLoader) -> Self {
        Self {
            api,
            loader,
            state: Arc::new(Mutex::new(RosterState::new())),
        }
    }

    pub fn state(&self) -> Arc<Mutex<RosterState>> {
        self.state.clone()
    }

    /// 重新拉取名册
    pub async fn refresh(&self) -> Result<()> {
        let records = self.api.list_patients().await?;
        info!("Roster refreshed, {} patients", records.len());
        self.state.lock().await.apply_roster(records);
        Ok(())
    }

    /// 批量删除当前选中的患者
    ///
    /// 删除请求并发发出；任一失败即报告统一错误，不对部分完成
    /// 做任何假设。成功后清空选中集与确认文本并重新拉取名册。
    pub async fn bulk_delete(&self) -> Result<()> {
        let ids: Vec<i64> = {
            let mut state = self.state.lock().await;
            if !state.can_confirm_delete() {
                return Err(MammoError::Validation(
                    "delete confirmation text and a selection are required".to_string(),
                ));
            }
            state.delete_error = None;
            state.selected.iter().copied().collect()
        };

        info!("Bulk deleting {} patients", ids.len());
        let results =
            futures::future::join_all(ids.iter().map(|id| self.api.delete_patient(*id))).await;

        if results.iter().any(|r| r.is_err()) {
            let mut state = self.state.lock().await;
            state.delete_error = Some(BULK_DELETE_FAILED_MESSAGE.to_string());
            return Err(MammoError::Internal(
                "one or more patient deletions failed".to_string(),
            ));
        }

        {
            let mut state = self.state.lock().await;
            state.selected.clear();
            state.confirmation_text.clear();
        }
        self.refresh().await
    }

    /// 加载并打开单个患者详情
    ///
    /// 成功时整体替换当前详情；失败保留旧详情，同一ID可重试。
    pub async fn open_detail(&self, id: i64) -> Result<()> {
        let view = self.loader.load(id).await?;
        self.state.lock().await.detail = Some(view);
        Ok(())
    }

    /// 订阅事件总线并在收到刷新信号时重新拉取名册
    ///
    /// 返回监听任务句柄；丢弃句柄或关闭总线即结束监听。
    pub fn spawn_refresh_listener(&self, bus: &EventBus) -> JoinHandle<()> {
        let api = self.api.clone();
        let state = self.state.clone();
        let mut receiver = bus.subscribe();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        debug!("Roster refresh triggered by {}", event.as_str());
                        match api.list_patients().await {
                            Ok(records) => state.lock().await.apply_roster(records),
                            Err(e) => warn!("Roster refresh failed: {}", e),
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Roster listener lagged, skipped {} events", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
