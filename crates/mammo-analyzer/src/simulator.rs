//! 分析模拟器
//!
//! 管理 `Idle → Running → Complete` 的分析生命周期，由定时tick
//! 驱动进度，完成时写入固定的演示分析结果。真实推理属于后端
//! 职责，此处只负责流程形态与资源生命周期。

use mammo_core::{AnalysisResult, MammoError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::session::SessionState;

/// 分析阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisPhase {
    #[default]
    Idle,
    Running,
    Complete,
}

impl AnalysisPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Complete => "Complete",
        }
    }
}

impl SessionState {
    /// `Idle → Running` 转换
    ///
    /// 仅在存在影像且身份字段完整时允许启动；进度归零，
    /// 上一轮的保存状态与结果一并清除。
    pub fn begin_analysis(&mut self) -> Result<()> {
        if self.phase != AnalysisPhase::Idle {
            return Err(MammoError::InvalidStateTransition {
                from: self.phase.as_str().to_string(),
                event: "StartAnalysis".to_string(),
            });
        }

        if self.draft.images.is_empty() {
            return Err(MammoError::Validation(
                "at least one image is required before analysis".to_string(),
            ));
        }

        if !self.draft.identity_complete() {
            self.flag_missing_identity();
            return Err(MammoError::Validation(
                "patient id and name are required before analysis".to_string(),
            ));
        }

        self.progress = 0;
        self.analysis = None;
        self.save_state.clear();
        self.save_message = None;
        self.save_error = None;
        self.phase = AnalysisPhase::Running;
        info!("Analysis started for patient '{}'", self.draft.name);
        Ok(())
    }

    /// 单次tick：进度步进，到达100时转入完成态
    ///
    /// 返回true表示本次tick触发了完成；完成逻辑至多触发一次，
    /// 非运行态的tick是无操作。
    pub fn advance_progress(&mut self) -> bool {
        if self.phase != AnalysisPhase::Running {
            return false;
        }

        let step = self.config.progress_step.min(100);
        self.progress = self.progress.saturating_add(step).min(100);

        if self.progress >= 100 {
            self.phase = AnalysisPhase::Complete;
            self.analysis = Some(AnalysisResult::mock());
            info!("Analysis complete");
            true
        } else {
            false
        }
    }
}

/// 模拟器任务句柄
///
/// 与会话状态一同持有；启动新一轮或任何会话重置前必须先取消
/// 旧句柄。取消是幂等的，任务自身在完成或代数失配时也会退出。
#[derive(Debug)]
pub struct SimulatorTask {
    handle: JoinHandle<()>,
}

impl SimulatorTask {
    /// 取消正在进行的模拟
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// 等待任务自然结束（测试用）
    pub async fn join(mut self) {
        // JoinHandle是Unpin，按可变引用await即可，句柄留在原位给Drop
        let _ = (&mut self.handle).await;
    }
}

impl Drop for SimulatorTask {
    fn drop(&mut self) {
        // 句柄被丢弃即视为会话放弃了这轮分析
        self.handle.abort();
    }
}

/// 启动定时tick任务
///
/// `generation` 为启动时的会话代数：会话在任务存活期间被重置
/// 的话，后续tick发现代数失配即自行退出，不会改写新会话。
pub fn spawn_simulator(
    state: Arc<Mutex<SessionState>>,
    generation: u64,
    tick_interval: Duration,
) -> SimulatorTask {
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval的首个tick立即完成，跳过以保证稳定节奏
        interval.tick().await;

        loop {
            interval.tick().await;
            let mut session = state.lock().await;
            if session.generation != generation {
                debug!("Simulator tick for a discarded session, exiting");
                break;
            }
            if session.advance_progress() {
                break;
            }
        }
    });

    SimulatorTask { handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mammo_core::config::AnalyzerConfig;
    use mammo_core::ImageBlob;

    fn ready_session() -> SessionState {
        let mut session = SessionState::new(AnalyzerConfig::default());
        session.set_patient_id(Some("PT-1".to_string()));
        session.set_name("Jane Doe");
        session.replace_images(vec![ImageBlob {
            file_name: "scan.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![0u8; 16],
        }]);
        session
    }

    #[test]
    fn test_begin_requires_image() {
        let mut session = SessionState::new(AnalyzerConfig::default());
        session.set_patient_id(Some("PT-1".to_string()));
        session.set_name("Jane Doe");

        let result = session.begin_analysis();
        assert!(matches!(result, Err(MammoError::Validation(_))));
        assert_eq!(session.phase(), AnalysisPhase::Idle);
    }

    #[test]
    fn test_begin_requires_identity() {
        let mut session = ready_session();
        session.set_name("");

        let result = session.begin_analysis();
        assert!(matches!(result, Err(MammoError::Validation(_))));
        assert!(!session.invalid_fields().is_empty());
    }

    #[test]
    fn test_begin_rejected_while_running_or_complete() {
        let mut session = ready_session();
        session.begin_analysis().unwrap();
        assert!(matches!(
            session.begin_analysis(),
            Err(MammoError::InvalidStateTransition { .. })
        ));

        while !session.advance_progress() {}
        assert!(matches!(
            session.begin_analysis(),
            Err(MammoError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_progress_steps_strictly_by_ten() {
        let mut session = ready_session();
        session.begin_analysis().unwrap();

        let mut observed = Vec::new();
        let mut completions = 0;
        for _ in 0..20 {
            if session.advance_progress() {
                completions += 1;
            }
            observed.push(session.progress());
        }

        assert_eq!(&observed[..10], &[10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        // 完成后继续tick既不推进也不重复触发完成
        assert!(observed[10..].iter().all(|p| *p == 100));
        assert_eq!(completions, 1);
        assert!(session.analysis().is_some());
    }

    #[tokio::test]
    async fn test_spawned_simulator_runs_to_completion() {
        let state = Arc::new(Mutex::new({
            let mut config = AnalyzerConfig::default();
            config.tick_interval_ms = 1;
            let mut session = ready_session();
            session.config = config;
            session
        }));

        let (generation, interval) = {
            let mut session = state.lock().await;
            session.begin_analysis().unwrap();
            (
                session.generation,
                Duration::from_millis(session.config.tick_interval_ms),
            )
        };

        let task = spawn_simulator(state.clone(), generation, interval);
        tokio::time::timeout(Duration::from_secs(5), task.join())
            .await
            .expect("simulator should finish");

        let session = state.lock().await;
        assert_eq!(session.progress(), 100);
        assert!(session.analysis_complete());
        assert!(session.analysis().is_some());
    }

    #[tokio::test]
    async fn test_stale_tick_cannot_mutate_reset_session() {
        let state = Arc::new(Mutex::new({
            let mut config = AnalyzerConfig::default();
            config.tick_interval_ms = 1;
            let mut session = ready_session();
            session.config = config;
            session
        }));

        let (generation, interval) = {
            let mut session = state.lock().await;
            session.begin_analysis().unwrap();
            (
                session.generation,
                Duration::from_millis(session.config.tick_interval_ms),
            )
        };

        let task = spawn_simulator(state.clone(), generation, interval);

        // 重置会话：代数递增，旧任务的tick必须全部失效
        state.lock().await.reset_to_upload();
        tokio::time::timeout(Duration::from_secs(5), task.join())
            .await
            .expect("stale simulator should exit");

        let session = state.lock().await;
        assert_eq!(session.phase(), AnalysisPhase::Idle);
        assert_eq!(session.progress(), 0);
        assert!(session.analysis().is_none());
    }
}
