//! 渲染器模块
//!
//! 本模块提供了设备初始化和帧同步的通用逻辑，以及对外的统一入口 `Renderer`。
//! 应用程序通过 `Renderer` 与底层图形 API 交互，而不需要关心具体使用的是哪个后端。
//!
//! # 架构设计
//!
//! - `Renderer`：统一的渲染器接口，对外提供一致的 API
//! - `Backend`：内部枚举，封装不同后端上的 `FrameController`
//! - 子模块按组件划分，只依赖 `gfx::backend` 中的 trait

use tracing::info;

use crate::core::config::GraphicsBackend as BackendChoice;
use crate::core::error::Result;
use crate::core::Config;
use crate::gfx::backend::SurfaceHandle;
#[cfg(target_os = "windows")]
use crate::gfx::dx12::{Dx12, Dx12Instance};
use crate::gfx::headless::{Headless, HeadlessInstance};

// 通用渲染器组件（与具体 API 无关）
pub mod device;
pub mod sync;
pub mod command;
pub mod descriptor;
pub mod resource;
pub mod swapchain;
pub mod frame;

use device::AdapterInfo;
use frame::FrameController;

/// 图形后端枚举
///
/// 封装不同的图形 API 实现，支持运行时选择使用哪个后端。
/// 通过枚举模式实现零成本抽象，避免动态分发的性能开销。
enum Backend {
    #[cfg(target_os = "windows")]
    Dx12(FrameController<Dx12>),
    Headless(FrameController<Headless>),
}

/// 统一的渲染器
pub struct Renderer {
    backend: Backend,
}

impl Renderer {
    /// 按配置选择后端并完成初始化
    ///
    /// # 参数
    ///
    /// * `surface` - 窗口表面（DirectX 12 要求 Win32 窗口）
    /// * `config` - 引擎配置
    pub fn new(surface: SurfaceHandle, config: &Config) -> Result<Self> {
        let backend = match config.graphics.backend {
            #[cfg(target_os = "windows")]
            BackendChoice::Dx12 => {
                info!("Initializing DX12 Backend");
                let instance = Dx12Instance::new(config.graphics.debug_layer)?;
                Backend::Dx12(FrameController::bring_up(&instance, surface, config)?)
            }
            #[cfg(not(target_os = "windows"))]
            BackendChoice::Dx12 => {
                return Err(crate::core::error::DistGfxError::Initialization(
                    "DX12 backend is only available on Windows".to_string(),
                ));
            }
            BackendChoice::Headless => {
                info!("Initializing Headless Backend");
                let instance = HeadlessInstance::default();
                Backend::Headless(FrameController::bring_up(&instance, surface, config)?)
            }
        };

        Ok(Self { backend })
    }

    /// 渲染一帧：清除后缓冲和深度缓冲，然后呈现
    pub fn draw(&mut self) -> Result<()> {
        match &mut self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.render_frame(|_| Ok(())),
            Backend::Headless(r) => r.render_frame(|_| Ok(())),
        }
    }

    /// 窗口大小改变
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        match &mut self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.resize(width, height),
            Backend::Headless(r) => r.resize(width, height),
        }
    }

    /// 等待 GPU 完成所有已提交的工作
    pub fn flush(&mut self) -> Result<()> {
        match &mut self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.flush(),
            Backend::Headless(r) => r.flush(),
        }
    }

    /// 选中的适配器
    pub fn adapter(&self) -> &AdapterInfo {
        match &self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.device().adapter(),
            Backend::Headless(r) => r.device().adapter(),
        }
    }

    /// 已提交的帧数
    pub fn frame_count(&self) -> u64 {
        match &self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(r) => r.frame_count(),
            Backend::Headless(r) => r.frame_count(),
        }
    }

    /// 获取后端的名称
    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            #[cfg(target_os = "windows")]
            Backend::Dx12(_) => BackendChoice::Dx12.name(),
            Backend::Headless(_) => BackendChoice::Headless.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headless_config() -> Config {
        let mut config = Config::default();
        config.graphics.backend = BackendChoice::Headless;
        config
    }

    #[test]
    fn test_headless_renderer_draws() {
        let mut renderer = Renderer::new(SurfaceHandle::detached(), &headless_config()).unwrap();
        assert_eq!(renderer.backend_name(), "Headless");
        assert!(!renderer.adapter().software);

        for _ in 0..3 {
            renderer.draw().unwrap();
        }
        renderer.resize(640, 480).unwrap();
        renderer.draw().unwrap();
        renderer.flush().unwrap();
        assert_eq!(renderer.frame_count(), 4);
    }

    #[test]
    fn test_warp_requested_by_config() {
        let mut config = headless_config();
        config.graphics.force_software_adapter = true;
        let renderer = Renderer::new(SurfaceHandle::detached(), &config).unwrap();
        assert!(renderer.adapter().software);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_dx12_unavailable_off_windows() {
        let result = Renderer::new(SurfaceHandle::detached(), &Config::default());
        assert!(matches!(
            result,
            Err(crate::core::error::DistGfxError::Initialization(_))
        ));
    }
}
