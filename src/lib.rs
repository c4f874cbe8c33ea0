//! DistGfx - Direct3D 12 设备初始化与帧同步核心
//!
//! 负责图形设备的创建、CPU/GPU 帧同步、命令提交、描述符堆、交换链和深度缓冲，
//! 并提供一个清屏后呈现的最小帧循环。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（日志、配置、错误处理、计时器）
//! - `renderer`: 与具体 API 无关的设备、同步和帧控制逻辑
//! - `gfx`: 图形后端抽象层（DirectX 12、Headless）
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_gfx::core::Config;
//! use dist_gfx::gfx::SurfaceHandle;
//! use dist_gfx::renderer::Renderer;
//!
//! let mut config = Config::default();
//! config.apply_args(["dist_gfx", "--headless"]);
//!
//! let mut renderer = Renderer::new(SurfaceHandle::detached(), &config)?;
//! renderer.draw()?;
//! renderer.flush()?;
//! # Ok::<(), dist_gfx::core::DistGfxError>(())
//! ```

pub mod core;
pub mod renderer;
pub mod gfx;
