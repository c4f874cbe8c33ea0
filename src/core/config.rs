//! 配置管理模块
//!
//! 提供图形子系统配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 768
//! title = "DistGfx"
//! resizable = true
//!
//! [graphics]
//! backend = "dx12"          # 或 "headless"
//! vsync = true
//! buffer_count = 2
//! msaa_samples = 1
//! min_feature_level = "11_0"
//! force_software_adapter = false
//! frame_sync = "per_frame"  # 或 "flush"
//! clear_color = [0.0, 0.2, 0.4, 1.0]
//!
//! [logging]
//! level = "info"            # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::renderer::device::FeatureLevel;

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 是否可调整大小
    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 垂直同步（呈现间隔 1 或 0）
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// 交换链后缓冲数量
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    /// MSAA 采样数（仅用于设备能力查询）
    #[serde(default = "default_msaa")]
    pub msaa_samples: u32,

    /// 适配器必须支持的最低特性级别
    #[serde(default = "default_min_feature_level")]
    pub min_feature_level: FeatureLevel,

    /// 跳过硬件适配器，直接使用软件适配器（WARP）
    #[serde(default)]
    pub force_software_adapter: bool,

    /// 启用 D3D12 调试层
    #[serde(default = "default_debug_layer")]
    pub debug_layer: bool,

    /// CPU/GPU 帧同步策略
    #[serde(default = "default_frame_sync")]
    pub frame_sync: FrameSync,

    /// 后缓冲清除颜色
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// DirectX 12 后端（仅 Windows）
    Dx12,
    /// 无窗口的模拟 GPU 后端
    Headless,
}

/// 帧同步策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSync {
    /// 每个后缓冲记录自己的 fence 值，只在复用该帧的分配器前等待
    PerFrame,
    /// 每帧提交后立即等待 GPU 完成
    Flush,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 768 }
fn default_title() -> String { "DistGfx".to_string() }
fn default_resizable() -> bool { true }
fn default_backend() -> GraphicsBackend { GraphicsBackend::Dx12 }
fn default_vsync() -> bool { true }
fn default_buffer_count() -> u32 { 2 }
fn default_msaa() -> u32 { 1 }
fn default_min_feature_level() -> FeatureLevel { FeatureLevel::Level11_0 }
fn default_debug_layer() -> bool { cfg!(debug_assertions) }
fn default_frame_sync() -> FrameSync { FrameSync::PerFrame }
fn default_clear_color() -> [f32; 4] { [0.0, 0.2, 0.4, 1.0] }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "distgfx.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: default_resizable(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            vsync: default_vsync(),
            buffer_count: default_buffer_count(),
            msaa_samples: default_msaa(),
            min_feature_level: default_min_feature_level(),
            force_software_adapter: false,
            debug_layer: default_debug_layer(),
            frame_sync: default_frame_sync(),
            clear_color: default_clear_color(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use dist_gfx::core::Config;
    ///
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--dx12` / `--headless`: 选择图形后端
    /// - `--warp`: 强制使用软件适配器
    /// - `--no-vsync`: 关闭垂直同步
    /// - `--flush-sync`: 每帧等待 GPU 完成
    /// - `--width <value>` / `--height <value>`: 窗口尺寸
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--dx12") {
            self.graphics.backend = GraphicsBackend::Dx12;
        }

        if args.iter().any(|a| a == "--headless") {
            self.graphics.backend = GraphicsBackend::Headless;
        }

        if args.iter().any(|a| a == "--warp") {
            self.graphics.force_software_adapter = true;
        }

        if args.iter().any(|a| a == "--no-vsync") {
            self.graphics.vsync = false;
        }

        if args.iter().any(|a| a == "--flush-sync") {
            self.graphics.frame_sync = FrameSync::Flush;
        }

        if let Some(idx) = args.iter().position(|a| a == "--width") {
            if let Some(width) = args.get(idx + 1).and_then(|s| s.parse().ok()) {
                self.window.width = width;
            }
        }

        if let Some(idx) = args.iter().position(|a| a == "--height") {
            if let Some(height) = args.get(idx + 1).and_then(|s| s.parse().ok()) {
                self.window.height = height;
            }
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }.into());
        }

        // flip 模型交换链要求 2..=16 个缓冲
        if !(2..=16).contains(&self.graphics.buffer_count) {
            return Err(ConfigError::InvalidValue {
                field: "graphics.buffer_count".to_string(),
                reason: "Buffer count must be between 2 and 16".to_string(),
            }.into());
        }

        if !matches!(self.graphics.msaa_samples, 1 | 2 | 4 | 8 | 16) {
            return Err(ConfigError::InvalidValue {
                field: "graphics.msaa_samples".to_string(),
                reason: "MSAA samples must be 1, 2, 4, 8, or 16".to_string(),
            }.into());
        }

        Ok(())
    }

    /// 呈现间隔：开启垂直同步时为 1
    pub fn sync_interval(&self) -> u32 {
        if self.graphics.vsync { 1 } else { 0 }
    }
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Dx12 => "DirectX 12",
            GraphicsBackend::Headless => "Headless",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 768);
        assert_eq!(config.graphics.backend, GraphicsBackend::Dx12);
        assert_eq!(config.graphics.buffer_count, 2);
        assert_eq!(config.graphics.frame_sync, FrameSync::PerFrame);
        assert_eq!(config.sync_interval(), 1);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.buffer_count = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.msaa_samples = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            backend = "headless"
            min_feature_level = "12_0"
            frame_sync = "flush"
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, GraphicsBackend::Headless);
        assert_eq!(config.graphics.min_feature_level, FeatureLevel::Level12_0);
        assert_eq!(config.graphics.frame_sync, FrameSync::Flush);
        assert_eq!(config.graphics.buffer_count, 2);
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(["dist_gfx", "--headless", "--warp", "--no-vsync", "--width", "640", "--height", "abc"]);

        assert_eq!(config.graphics.backend, GraphicsBackend::Headless);
        assert!(config.graphics.force_software_adapter);
        assert_eq!(config.sync_interval(), 0);
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 768);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = Config::from_toml_str("[graphics]\nbackend = \"vulkan\"");
        assert!(matches!(
            result,
            Err(crate::core::error::DistGfxError::Config(ConfigError::ParseError(_)))
        ));
    }
}
