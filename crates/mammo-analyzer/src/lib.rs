//! # MammoScan Analyzer
//!
//! 分析会话工作流：影像导入、模拟分析、脏状态跟踪与持久化。
//! 会话状态归分析器独占，名册只能通过一次性种子或事件总线
//! 与其交互。

pub mod ingest;
pub mod persist;
pub mod session;
pub mod signature;
pub mod simulator;

pub use persist::{PersistenceGateway, SaveOutcome, SAVE_FAILED_MESSAGE};
pub use session::{AnalyzerSeed, IdentityField, ResultTab, SessionState};
pub use simulator::{AnalysisPhase, SimulatorTask};

use mammo_client::PatientApi;
use mammo_core::config::AnalyzerConfig;
use mammo_core::events::EventBus;
use mammo_core::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// 分析器门面
///
/// 持有会话状态与当前模拟器任务句柄。所有会改变分析生命周期的
/// 操作（上传、启动、返回上传页）都先取消旧的模拟器句柄，再改写
/// 会话，保证不会有过期tick落在新会话上。
pub struct Analyzer {
    state: Arc<Mutex<SessionState>>,
    sim_task: Option<SimulatorTask>,
    gateway: PersistenceGateway,
}

impl Analyzer {
    /// 创建新的分析器会话
    pub fn new(config: AnalyzerConfig, api: Arc<dyn PatientApi>, bus: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new(config))),
            sim_task: None,
            gateway: PersistenceGateway::new(api, bus),
        }
    }

    /// 会话状态句柄（视图层读取用）
    pub fn state(&self) -> Arc<Mutex<SessionState>> {
        self.state.clone()
    }

    fn cancel_simulator(&mut self) {
        if let Some(task) = self.sim_task.take() {
            debug!("Cancelling in-flight simulator task");
            task.cancel();
        }
    }

    /// 导入选中的影像文件（重新上传会取消进行中的分析）
    pub async fn upload_images(&mut self, paths: Vec<PathBuf>) -> Result<()> {
        self.cancel_simulator();
        ingest::ingest_files(&self.state, paths).await
    }

    /// 启动模拟分析
    pub async fn start_analysis(&mut self) -> Result<()> {
        self.cancel_simulator();

        let (generation, interval) = {
            let mut session = self.state.lock().await;
            session.begin_analysis()?;
            (
                session.generation,
                Duration::from_millis(session.config.tick_interval_ms),
            )
        };

        self.sim_task = Some(simulator::spawn_simulator(
            self.state.clone(),
            generation,
            interval,
        ));
        Ok(())
    }

    /// 返回上传页，丢弃当前分析
    pub async fn back_to_upload(&mut self) {
        self.cancel_simulator();
        self.state.lock().await.reset_to_upload();
    }

    /// 用名册详情页的种子整体替换会话
    pub async fn apply_seed(&mut self, seed: AnalyzerSeed) {
        self.cancel_simulator();
        self.state.lock().await.apply_seed(seed);
    }

    /// 保存当前分析到患者记录
    ///
    /// 返回 `Ok(None)` 表示已有保存在途，本次请求被忽略。
    pub async fn save(&self) -> Result<Option<SaveOutcome>> {
        self.gateway.save(&self.state).await
    }

    /// 等待进行中的模拟分析结束（演示程序用）
    pub async fn wait_for_analysis(&mut self) {
        if let Some(task) = self.sim_task.take() {
            task.join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mammo_client::testing::InMemoryPatientApi;
    use mammo_core::ImageBlob;

    fn fast_analyzer() -> (Analyzer, Arc<InMemoryPatientApi>) {
        let api = Arc::new(InMemoryPatientApi::new());
        let mut config = AnalyzerConfig::default();
        config.tick_interval_ms = 1;
        config.upload_transition_ms = 1;
        let analyzer = Analyzer::new(
            config,
            api.clone() as Arc<dyn PatientApi>,
            EventBus::default(),
        );
        (analyzer, api)
    }

    async fn seed_images(analyzer: &Analyzer, count: usize) {
        let mut session = analyzer.state.lock().await;
        session.set_patient_id(Some("PT-1".to_string()));
        session.set_name("Jane Doe");
        session.set_scan_date("2025-11-12");
        let images = (0..count)
            .map(|i| ImageBlob {
                file_name: format!("scan{i}.png"),
                content_type: "image/png".to_string(),
                data: vec![i as u8; 8],
            })
            .collect();
        session.replace_images(images);
    }

    #[tokio::test]
    async fn test_full_workflow_analyze_then_save() {
        let (mut analyzer, api) = fast_analyzer();
        seed_images(&analyzer, 1).await;

        analyzer.start_analysis().await.unwrap();
        analyzer.wait_for_analysis().await;

        {
            let session = analyzer.state.lock().await;
            assert!(session.analysis_complete());
            assert_eq!(session.progress(), 100);
        }

        let outcome = analyzer.save().await.unwrap().unwrap();
        assert!(outcome.assigned_id.is_some());
        assert_eq!(api.roster_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_back_to_upload_cancels_and_clears() {
        let (mut analyzer, _api) = fast_analyzer();
        seed_images(&analyzer, 2).await;

        analyzer.start_analysis().await.unwrap();
        analyzer.back_to_upload().await;

        let session = analyzer.state.lock().await;
        assert_eq!(session.phase(), AnalysisPhase::Idle);
        assert_eq!(session.progress(), 0);
        assert!(session.draft().images.is_empty());
        assert!(analyzer.sim_task.is_none());
    }

    #[tokio::test]
    async fn test_restart_after_reset_runs_cleanly() {
        let (mut analyzer, _api) = fast_analyzer();
        seed_images(&analyzer, 1).await;

        analyzer.start_analysis().await.unwrap();
        analyzer.back_to_upload().await;

        // 第二轮会话不受第一轮残留影响
        seed_images(&analyzer, 1).await;
        analyzer.start_analysis().await.unwrap();
        analyzer.wait_for_analysis().await;

        let session = analyzer.state.lock().await;
        assert!(session.analysis_complete());
    }
}
