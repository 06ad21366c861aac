//! # MammoScan Core
//!
//! 乳腺影像分析系统的核心模块，提供基础数据结构、错误定义、配置和事件总线。

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{MammoError, Result};
pub use models::*;
