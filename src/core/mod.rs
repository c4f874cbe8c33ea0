//! 核心功能模块
//!
//! 本模块提供了图形子系统的基础功能，包括日志系统、配置管理、错误处理和帧计时。
//! 这些模块独立于具体的图形 API，可以在任何后端中使用。
//!
//! # 模块组织
//!
//! - `log`：日志系统，提供结构化的日志记录功能
//! - `config`：配置管理，支持从配置文件和命令行加载设置
//! - `error`：错误处理，定义统一的错误类型和致命图形错误
//! - `timer`：帧计时器，统计运行时间和帧间隔

pub mod log;
pub mod config;
pub mod error;
pub mod timer;

// 重新导出常用类型，方便使用
pub use error::{Result, DistGfxError, GraphicsError, GraphicsErrorKind};
pub use config::Config;
pub use timer::GameTimer;
