//! 名册到分析器的跳转交接
//!
//! 详情页跳转到分析页时，把患者的基本信息、影像URL和最近一次
//! 分析打包成会话种子，通过一次性槽位传递。种子取走即清空，
//! 刷新或重复进入不会重放旧数据。

use mammo_analyzer::AnalyzerSeed;
use mammo_core::AnalysisResult;
use std::sync::Mutex;

use crate::detail::PatientDetailView;

/// 由患者详情构造分析器会话种子
///
/// 最近一次分析（详情中已排在首位）还原为展示结果；没有任何
/// 历史分析时给出占位摘要。
pub fn build_analyzer_seed(detail: &PatientDetailView) -> AnalyzerSeed {
    let summary = detail
        .analyses
        .first()
        .map(AnalysisResult::from_summary)
        .unwrap_or_else(AnalysisResult::not_yet_generated);

    AnalyzerSeed {
        name: detail.name.clone(),
        age: detail.age,
        image_urls: detail.image_urls.clone(),
        summary,
    }
}

/// 一次性种子槽位
///
/// 放入会覆盖旧值，取出后槽位立即清空。
#[derive(Default)]
pub struct HandoffSlot {
    seed: Mutex<Option<AnalyzerSeed>>,
}

impl HandoffSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入待交接的种子，覆盖未被取走的旧值
    pub fn place(&self, seed: AnalyzerSeed) {
        let mut slot = self.seed.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(seed);
    }

    /// 取走种子；只有第一次调用能取到
    pub fn take(&self) -> Option<AnalyzerSeed> {
        let mut slot = self.seed.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }
}
