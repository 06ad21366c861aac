//! # MammoScan Client
//!
//! 患者API客户端模块，提供：
//! - 患者资源的REST访问（列表、详情、创建、更新、删除）
//! - 仪表盘统计与历史分析拉取
//! - 影像资源URL解析

pub mod api;
pub mod assets;
pub mod testing;

pub use api::{HttpPatientApi, PatientApi};
pub use assets::AssetResolver;
