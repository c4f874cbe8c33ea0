//! 错误处理模块
//!
//! 定义了图形子系统中使用的统一错误类型。
//!
//! # 设计原则
//!
//! - 所有失败都是致命的：构建失败和帧内失败都向上传播，不做重试
//! - 图形错误携带来源位置（文件、行号）、可选说明、可选原生状态码及其系统描述
//! - 来源位置通过 `#[track_caller]` 自动捕获
//! - 易于模式匹配和错误处理

use std::fmt;
use std::panic::Location;

/// 统一的 Result 类型
///
/// 所有可能返回错误的函数都应该使用这个类型。
pub type Result<T> = std::result::Result<T, DistGfxError>;

/// DistGfx 的错误类型
#[derive(Debug)]
pub enum DistGfxError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误（致命）
    Graphics(GraphicsError),

    /// IO 错误
    Io(std::io::Error),

    /// 初始化错误（窗口、后端选择等）
    Initialization(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形错误的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsErrorKind {
    /// 工厂/适配器/设备创建失败
    DeviceCreation,
    /// 命令队列、分配器或命令列表的原生调用失败
    CommandExecution,
    /// Fence 信号或等待失败
    Synchronization,
    /// 描述符堆创建或访问失败
    Descriptor,
    /// 交换链创建、获取缓冲区、调整大小失败
    SwapChain,
    /// 呈现失败
    Presentation,
    /// GPU 资源创建失败
    ResourceCreation,
    /// 设备丢失或等待永远无法完成
    DeviceLost,
    /// 状态机被违反（例如未 reset 就重新录制命令列表）
    InvalidState,
}

impl GraphicsErrorKind {
    /// 类别名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsErrorKind::DeviceCreation => "Device Creation",
            GraphicsErrorKind::CommandExecution => "Command Execution",
            GraphicsErrorKind::Synchronization => "Synchronization",
            GraphicsErrorKind::Descriptor => "Descriptor Heap",
            GraphicsErrorKind::SwapChain => "Swap Chain",
            GraphicsErrorKind::Presentation => "Presentation",
            GraphicsErrorKind::ResourceCreation => "Resource Creation",
            GraphicsErrorKind::DeviceLost => "Device Lost",
            GraphicsErrorKind::InvalidState => "Invalid State",
        }
    }
}

/// 原生状态码（HRESULT）及系统翻译的描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeStatus {
    /// 状态码
    pub code: i32,
    /// 系统提供的文字描述
    pub description: String,
}

/// 图形 API 错误
///
/// 保留来源位置、说明和原生状态，供顶层处理器显示后终止进程。
#[derive(Debug, Clone)]
pub struct GraphicsError {
    kind: GraphicsErrorKind,
    file: &'static str,
    line: u32,
    note: Option<String>,
    status: Option<NativeStatus>,
}

impl GraphicsError {
    /// 在调用位置创建错误
    #[track_caller]
    pub fn new(kind: GraphicsErrorKind) -> Self {
        let location = Location::caller();
        Self {
            kind,
            file: location.file(),
            line: location.line(),
            note: None,
            status: None,
        }
    }

    /// 附加说明
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// 附加原生状态码和描述
    pub fn with_status(mut self, code: i32, description: impl Into<String>) -> Self {
        self.status = Some(NativeStatus {
            code,
            description: description.into(),
        });
        self
    }

    pub fn kind(&self) -> GraphicsErrorKind {
        self.kind
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn status(&self) -> Option<&NativeStatus> {
        self.status.as_ref()
    }

    /// 来源描述，格式为 `[FILE]`/`[LINE]`/`[NOTE]`/`[CODE]` 多行文本
    pub fn origin_string(&self) -> String {
        let mut out = format!("[FILE]: {}\n[LINE]: {}", self.file, self.line);
        if let Some(note) = &self.note {
            out.push_str(&format!("\n[NOTE]: {}", note));
        }
        if let Some(status) = &self.status {
            out.push_str(&format!(
                "\n[CODE]: {:#010X} ({})",
                status.code as u32,
                status.description.trim_end()
            ));
        }
        out
    }
}

/// 在调用位置构造图形错误的简写
#[track_caller]
pub fn graphics_error(kind: GraphicsErrorKind, note: impl Into<String>) -> DistGfxError {
    DistGfxError::Graphics(GraphicsError::new(kind).with_note(note))
}

impl fmt::Display for DistGfxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistGfxError::Config(e) => write!(f, "Configuration error: {}", e),
            DistGfxError::Graphics(e) => write!(f, "Graphics error: {}", e),
            DistGfxError::Io(e) => write!(f, "IO error: {}", e),
            DistGfxError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure\n{}", self.kind.name(), self.origin_string())
    }
}

impl std::error::Error for DistGfxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DistGfxError::Io(e) => Some(e),
            DistGfxError::Graphics(e) => Some(e),
            DistGfxError::Config(e) => Some(e),
            DistGfxError::Initialization(_) => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}

impl DistGfxError {
    /// 如果是图形错误，返回其类别
    pub fn graphics_kind(&self) -> Option<GraphicsErrorKind> {
        match self {
            DistGfxError::Graphics(e) => Some(e.kind()),
            _ => None,
        }
    }
}

// 实现 From trait 以便于错误转换
impl From<std::io::Error> for DistGfxError {
    fn from(err: std::io::Error) -> Self {
        DistGfxError::Io(err)
    }
}

impl From<ConfigError> for DistGfxError {
    fn from(err: ConfigError) -> Self {
        DistGfxError::Config(err)
    }
}

impl From<GraphicsError> for DistGfxError {
    fn from(err: GraphicsError) -> Self {
        DistGfxError::Graphics(err)
    }
}
