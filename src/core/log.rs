//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//!
//! # 级别约定
//!
//! - `info`：设备、交换链等生命周期事件
//! - `debug`：初始化步骤、CPU 等待 GPU、调整大小
//! - `trace`：每帧的提交、呈现、fence 值
//! - `warn`：回退到软件适配器、调试层不可用
//! - `error`：致命错误
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_gfx::core::log;
//! use dist_gfx::core::config::LogLevel;
//!
//! log::init_logger(LogLevel::Info, false, None);
//! tracing::info!(width = 1280, height = 768, "Window created");
//! ```

use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt,
    prelude::*,
    EnvFilter,
};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use std::path::Path;

use super::config::LogLevel;

const DEFAULT_LOG_FILE: &str = "distgfx.log";

/// 初始化日志系统
///
/// 必须在程序开始时调用一次。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "distgfx.log"）
///
/// 设置了 `RUST_LOG` 时，其中的指令叠加在配置的级别之上。
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(level, env.as_deref());

    if file_output {
        let log_path = log_file_path.unwrap_or(DEFAULT_LOG_FILE);
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(DEFAULT_LOG_FILE);

        // 每天滚动
        let file_appender = RollingFileAppender::new(
            Rotation::DAILY,
            directory,
            filename
        );

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(false)  // 文件不需要 ANSI 颜色
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

/// 以配置级别为默认指令的过滤器
fn env_filter(level: LogLevel, directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level.into()).into())
        .parse_lossy(directives.unwrap_or_default())
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_filter_uses_configured_level() {
        assert_eq!(env_filter(LogLevel::Warn, None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(env_filter(LogLevel::Trace, None).max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_env_directives_refine_filter() {
        let filter = env_filter(LogLevel::Info, Some("dist_gfx::renderer=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }
}
