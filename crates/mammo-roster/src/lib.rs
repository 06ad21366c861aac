//! # MammoScan Roster
//!
//! 患者名册：列表拉取、过滤、分页、多选与批量删除，以及
//! 详情加载和跳转分析器的会话种子交接。名册不直接触碰分析器
//! 会话，两者只通过事件总线和一次性种子槽位通信。

pub mod detail;
pub mod handoff;
pub mod roster;

pub use detail::{DetailLoader, PatientDetailView};
pub use handoff::{build_analyzer_seed, HandoffSlot};
pub use roster::{
    RosterManager, RosterState, BULK_DELETE_FAILED_MESSAGE, DELETE_CONFIRMATION,
    PAGE_SIZE_CHOICES,
};
