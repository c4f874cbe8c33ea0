//! 帧控制模块
//!
//! 按固定顺序驱动一帧：等待该后缓冲上一次的提交完成，重置分配器和命令列表，
//! 转换后缓冲状态并清除，交给调用方录制，关闭、提交、呈现，最后 signal 并记录 fence 值。
//!
//! # 初始化顺序
//!
//! 1. 设备（适配器选择 / WARP 回退）
//! 2. Fence、命令队列、分配器和命令列表
//! 3. 交换链和 RTV 堆
//! 4. 深度模板缓冲和 DSV 堆
//!
//! 销毁时先刷新命令队列，然后按字段声明顺序释放，设备最后释放。

use tracing::{debug, error, info, trace, warn};

use crate::core::config::{Config, FrameSync};
use crate::core::error::Result;
use crate::gfx::backend::{GraphicsBackend, RawCommandList, SurfaceHandle};
use crate::renderer::command::CommandContext;
use crate::renderer::descriptor::CpuDescriptorHandle;
use crate::renderer::device::{DeviceOptions, GraphicsDevice};
use crate::renderer::resource::{
    DepthStencilBuffer, FrameResourcePool, PixelFormat, ResourceState, ScissorRect, Viewport,
};
use crate::renderer::swapchain::{SwapChain, SwapChainDescriptor};
use crate::renderer::sync::FenceManager;

/// 深度缓冲格式
const DEPTH_FORMAT: PixelFormat = PixelFormat::Depth24UnormStencil8;

/// 每帧使用的设置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOptions {
    /// 后缓冲清除颜色
    pub clear_color: [f32; 4],
    /// 呈现间隔
    pub sync_interval: u32,
    pub frame_sync: FrameSync,
}

impl FrameOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            clear_color: config.graphics.clear_color,
            sync_interval: config.sync_interval(),
            frame_sync: config.graphics.frame_sync,
        }
    }
}

/// 交给绘制回调的当前帧信息
///
/// 回调被调用时后缓冲已处于 `RenderTarget` 状态，RTV 和 DSV 已清除并绑定。
pub struct FrameTarget<'a, B: GraphicsBackend> {
    /// 打开的命令列表
    pub list: &'a B::CommandList,
    pub back_buffer_index: u32,
    pub back_buffer: &'a B::Resource,
    pub rtv: CpuDescriptorHandle,
    pub dsv: CpuDescriptorHandle,
    pub viewport: Viewport,
    pub scissor: ScissorRect,
}

/// 帧控制器
pub struct FrameController<B: GraphicsBackend> {
    frames: FrameResourcePool,
    depth: DepthStencilBuffer<B>,
    swap_chain: SwapChain<B>,
    commands: CommandContext<B>,
    fence: FenceManager<B>,
    device: GraphicsDevice<B>,
    viewport: Viewport,
    scissor: ScissorRect,
    options: FrameOptions,
    frame_count: u64,
}

impl<B: GraphicsBackend> FrameController<B> {
    /// 选择适配器、创建设备，然后完成其余初始化
    pub fn bring_up(instance: &B::Instance, surface: SurfaceHandle, config: &Config) -> Result<Self> {
        let options = DeviceOptions {
            min_feature_level: config.graphics.min_feature_level,
            force_software: config.graphics.force_software_adapter,
        };
        let device = GraphicsDevice::create(instance, &options)?;
        Self::with_device(device, surface, config)
    }

    /// 在已创建的设备上完成初始化
    pub fn with_device(device: GraphicsDevice<B>, surface: SurfaceHandle, config: &Config) -> Result<Self> {
        let width = config.window.width;
        let height = config.window.height;
        let buffer_count = config.graphics.buffer_count;

        let samples = config.graphics.msaa_samples;
        if samples > 1 {
            let quality_levels = device.msaa_quality_levels(PixelFormat::Rgba8Unorm, samples)?;
            if quality_levels == 0 {
                warn!(samples, "MSAA sample count not supported by device");
            } else {
                debug!(samples, quality_levels, "MSAA capability queried");
            }
        }

        let fence = FenceManager::new(&device)?;
        let commands = CommandContext::new(&device, buffer_count as usize)?;

        let desc = SwapChainDescriptor::new(width, height).with_buffer_count(buffer_count);
        let swap_chain = SwapChain::new(&device, commands.queue(), surface, desc)?;
        let depth = DepthStencilBuffer::new(&device, width, height, DEPTH_FORMAT)?;
        let frames = FrameResourcePool::new(buffer_count as usize)?;

        info!(
            backend = B::name(),
            width,
            height,
            buffers = buffer_count,
            frame_sync = ?config.graphics.frame_sync,
            "Frame controller ready"
        );

        Ok(Self {
            frames,
            depth,
            swap_chain,
            commands,
            fence,
            device,
            viewport: Viewport::for_size(width, height),
            scissor: ScissorRect::for_size(width, height),
            options: FrameOptions::from_config(config),
            frame_count: 0,
        })
    }

    /// 渲染一帧
    ///
    /// 任何一步失败都会中止本帧并返回错误。
    ///
    /// # 参数
    ///
    /// * `draw` - 绘制回调，向打开的命令列表录制额外的命令
    pub fn render_frame<F>(&mut self, draw: F) -> Result<()>
    where
        F: FnOnce(&FrameTarget<'_, B>) -> Result<()>,
    {
        // 1. 等待该后缓冲上一次的提交，然后重置分配器和命令列表
        let index = self.swap_chain.current_back_buffer_index();
        let frame_index = index as usize;

        if let Some(value) = self.frames.pending_fence_value(frame_index) {
            self.fence.wait_for_value(value)?;
        }
        let completed = self.fence.completed_value();
        self.frames.update_availability(completed);

        self.commands.reset(frame_index, &mut self.fence)?;

        // 2-4. 视口、屏障、清除、绘制回调、屏障
        let back_buffer = self.swap_chain.current_back_buffer()?;
        let rtv = self.swap_chain.current_rtv()?;
        let dsv = self.depth.dsv();
        let viewport = self.viewport;
        let scissor = self.scissor;
        let clear_color = self.options.clear_color;

        self.commands.record(|list| {
            list.set_viewport_and_scissor(&viewport, &scissor);
            list.resource_barrier(back_buffer, ResourceState::Present, ResourceState::RenderTarget);
            list.clear_render_target(rtv, clear_color);
            list.clear_depth_stencil(dsv, 1.0, 0);
            list.set_render_target(rtv, Some(dsv));

            draw(&FrameTarget {
                list,
                back_buffer_index: index,
                back_buffer,
                rtv,
                dsv,
                viewport,
                scissor,
            })?;

            list.resource_barrier(back_buffer, ResourceState::RenderTarget, ResourceState::Present);
            Ok(())
        })?;

        // 5-7. 关闭、提交、呈现
        self.commands.close()?;
        self.commands.execute(&mut self.fence)?;
        self.swap_chain.present(self.options.sync_interval)?;

        // 8. signal 并记录该帧的 fence 值
        let value = self.fence.signal(self.commands.queue())?;
        self.commands.on_signal(value);
        if let Some(frame) = self.frames.get_mut(frame_index) {
            frame.mark_in_use(value);
        }

        if self.options.frame_sync == FrameSync::Flush {
            self.fence.wait_for_value(value)?;
            self.frames.update_availability(value);
        }

        self.frame_count += 1;
        trace!(
            frame = self.frame_count,
            back_buffer = index,
            fence_value = value.value(),
            "Frame submitted"
        );

        Ok(())
    }

    /// 调整表面大小
    ///
    /// 宽或高为 0（窗口最小化）以及尺寸未变化时忽略。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            debug!(width, height, "Ignoring resize to empty surface");
            return Ok(());
        }

        if self.swap_chain.size() == (width, height) {
            return Ok(());
        }

        self.flush()?;

        self.swap_chain.resize(&self.device, width, height)?;
        self.depth.recreate(&self.device, width, height)?;
        self.viewport = Viewport::for_size(width, height);
        self.scissor = ScissorRect::for_size(width, height);
        self.frames.mark_all_available();

        info!(width, height, "Surface resized");
        Ok(())
    }

    /// 等待 GPU 完成所有已提交的工作
    pub fn flush(&mut self) -> Result<()> {
        if let Some(value) = self.fence.flush(self.commands.queue())? {
            self.commands.on_signal(value);
        }
        Ok(())
    }

    pub fn device(&self) -> &GraphicsDevice<B> {
        &self.device
    }

    pub fn swap_chain(&self) -> &SwapChain<B> {
        &self.swap_chain
    }

    pub fn fence(&self) -> &FenceManager<B> {
        &self.fence
    }

    pub fn commands(&self) -> &CommandContext<B> {
        &self.commands
    }

    pub fn depth_buffer(&self) -> &DepthStencilBuffer<B> {
        &self.depth
    }

    pub fn frames(&self) -> &FrameResourcePool {
        &self.frames
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor(&self) -> ScissorRect {
        self.scissor
    }

    pub fn options(&self) -> &FrameOptions {
        &self.options
    }

    /// 已提交的帧数
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl<B: GraphicsBackend> Drop for FrameController<B> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(error = %e, "Failed to flush GPU queue during teardown");
        }

        #[cfg(debug_assertions)]
        debug!(frames = self.frame_count, "Frame controller destroyed");
    }
}
