//! DistGfx - Direct3D 12 设备初始化与帧同步
//!
//! 打开一个窗口，完成图形设备初始化，然后每帧清除后缓冲并呈现。
//! 可以通过配置文件或命令行参数选择使用的图形后端。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 使用软件适配器（WARP）
//! cargo run -- --warp
//!
//! # 不依赖 D3D12 的冒烟运行
//! cargo run -- --headless
//! ```
//!
//! # 架构概览
//!
//! ```text
//! ┌─────────────┐
//! │   main.rs   │  应用程序入口
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │  Renderer   │  统一渲染接口
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │ FrameCtrl   │  设备 / 同步 / 命令 / 交换链
//! └──────┬──────┘
//!        │
//!   ┌────┴─────┐
//!   │          │
//! ┌─▼──┐  ┌────▼───┐
//! │DX12│  │Headless│  具体后端实现
//! └────┘  └────────┘
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use tracing::{debug, error, info};
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use dist_gfx::core::{log, Config, GameTimer};
use dist_gfx::gfx::SurfaceHandle;
use dist_gfx::renderer::Renderer;

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载引擎配置文件（config.toml）
/// 2. 应用命令行参数覆盖
/// 3. 初始化日志系统
/// 4. 创建窗口和渲染器
/// 5. 启动主循环
fn main() {
    if let Err(e) = run() {
        error!("{:#}", e);
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");

    // 2. 应用命令行参数
    config.apply_args(std::env::args());
    config.validate().context("Invalid configuration")?;

    // 3. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), "DistGfx starting...");

    info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        vsync = config.graphics.vsync,
        frame_sync = ?config.graphics.frame_sync,
        "Graphics configuration"
    );

    // 4. 创建窗口
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let base_title = format!("{} [{}]", config.window.title, config.graphics.backend.name());
    let window = WindowBuilder::new()
        .with_title(base_title.as_str())
        .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
        .with_resizable(config.window.resizable)
        .build(&event_loop)
        .context("Failed to create window")?;

    // 5. 创建渲染器
    let surface = SurfaceHandle::from_window(&window)?;
    let mut renderer = Renderer::new(surface, &config).context("Failed to initialize renderer")?;
    info!(
        backend = renderer.backend_name(),
        adapter = %renderer.adapter().description,
        "Renderer initialized successfully"
    );

    let mut timer = GameTimer::new();
    let mut frames_in_second = 0u32;
    let mut second_start = 0.0f32;

    // 主循环内的致命错误，循环退出后由 run 返回
    let fatal: Rc<RefCell<Option<anyhow::Error>>> = Rc::new(RefCell::new(None));
    let loop_fatal = Rc::clone(&fatal);

    info!("Entering main loop...");

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    info!("Close requested, shutting down...");
                    elwt.exit();
                }
                WindowEvent::Resized(new_size) => {
                    debug!(width = new_size.width, height = new_size.height, "Window resized");
                    if record_fatal(&loop_fatal, renderer.resize(new_size.width, new_size.height), "Resize failed") {
                        elwt.exit();
                    }
                }
                // 窗口被遮挡时暂停计时
                WindowEvent::Occluded(occluded) => {
                    if occluded {
                        timer.stop();
                    } else {
                        timer.start();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                if timer.is_stopped() {
                    return;
                }
                timer.tick();

                if record_fatal(&loop_fatal, renderer.draw(), "Draw failed") {
                    elwt.exit();
                    return;
                }

                frames_in_second += 1;
                if timer.total_time() - second_start >= 1.0 {
                    let fps = frames_in_second;
                    let mspf = 1000.0 / fps as f32;
                    window.set_title(&format!("{}    fps: {}   mspf: {:.3}", base_title, fps, mspf));
                    frames_in_second = 0;
                    second_start += 1.0;
                }
            }
            Event::LoopExiting => {
                if let Err(e) = renderer.flush() {
                    error!("Final flush failed: {}", e);
                }
                info!(frames = renderer.frame_count(), "Main loop exited");
            }
            _ => {}
        }
    })?;

    take_fatal(&fatal)
}

/// 记录主循环中的错误，只保留第一个
///
/// 返回 `true` 表示发生了错误，调用方应退出循环。
fn record_fatal<E>(slot: &RefCell<Option<anyhow::Error>>, result: Result<(), E>, context: &'static str) -> bool
where
    E: std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(()) => false,
        Err(e) => {
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                *slot = Some(anyhow::Error::new(e).context(context));
            }
            true
        }
    }
}

/// 主循环结束后的结果
fn take_fatal(slot: &RefCell<Option<anyhow::Error>>) -> anyhow::Result<()> {
    match slot.borrow_mut().take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
