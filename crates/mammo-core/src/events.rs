//! 进程内事件总线
//!
//! 名册与分析器之间唯一的跨组件信号通道。保存成功后分析器发布
//! `PatientCreated`，名册订阅者据此重新拉取列表；事件不携带数据，
//! 丢失事件只会错过一次刷新提示，不会丢失数据。
//!
//! 生命周期约定：组件构造时调用 `subscribe`，组件销毁时丢弃
//! 返回的接收端即完成退订。

use tokio::sync::broadcast;
use tracing::debug;

/// 名册相关事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterEvent {
    /// 患者记录已创建或更新，名册应重新拉取
    PatientCreated,
}

impl RosterEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatientCreated => "patient.created",
        }
    }
}

/// 事件总线
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RosterEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件；没有订阅者时静默丢弃
    pub fn publish(&self, event: RosterEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!("Event {} delivered to {} subscribers", event.as_str(), receivers),
            Err(_) => debug!("Event {} dropped, no subscribers", event.as_str()),
        }
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(16)
    }
}
