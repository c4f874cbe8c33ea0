//! 图形后端模块
//!
//! 本模块封装了不同图形 API 的底层实现，包括：
//! - DirectX 12：Windows 平台的原生后端
//! - Headless：进程内模拟的 GPU，用于测试和没有 D3D12 的环境
//!
//! 所有后端都实现了 `backend` 中的统一 trait，
//! 渲染器模块中的通用逻辑对两种后端完全相同。

pub mod backend;
#[cfg(target_os = "windows")]
pub mod dx12;
pub mod headless;

pub use backend::{GraphicsBackend, SurfaceHandle};
#[cfg(target_os = "windows")]
pub use dx12::Dx12;
pub use headless::Headless;
