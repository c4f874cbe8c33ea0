//! 交换链模块
//!
//! 绑定到窗口表面的后缓冲环。每个后缓冲在 RTV 堆中占一个连续槽位。
//!
//! # 设计原则
//!
//! - **索引以原生为准**：当前后缓冲索引总是向原生交换链重新查询，并校验范围
//! - **呈现不等待**：`present` 不等待 GPU 完成，帧同步由 fence 负责
//! - **先释放再调整**：`resize` 在调整原生缓冲前释放所有后缓冲引用

use tracing::{debug, info, trace};

use crate::core::error::{graphics_error, GraphicsErrorKind, Result};
use crate::gfx::backend::{GraphicsBackend, RawDevice, RawSwapChain, SurfaceHandle};
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeap, DescriptorHeapDescriptor};
use crate::renderer::device::GraphicsDevice;
use crate::renderer::resource::PixelFormat;

/// 刷新率提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for RefreshRate {
    fn default() -> Self {
        Self { numerator: 60, denominator: 1 }
    }
}

/// 多重采样描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDesc {
    pub count: u32,
    pub quality: u32,
}

impl Default for SampleDesc {
    /// flip 模型交换链只能单采样
    fn default() -> Self {
        Self { count: 1, quality: 0 }
    }
}

/// 交换链描述信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    pub refresh_rate: RefreshRate,
    pub sample_desc: SampleDesc,
}

impl SwapChainDescriptor {
    /// 默认格式 `Rgba8Unorm`、双缓冲
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
            buffer_count: 2,
            refresh_rate: RefreshRate::default(),
            sample_desc: SampleDesc::default(),
        }
    }

    pub fn with_buffer_count(mut self, buffer_count: u32) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }
}

/// 交换链
pub struct SwapChain<B: GraphicsBackend> {
    raw: B::SwapChain,
    desc: SwapChainDescriptor,
    surface: SurfaceHandle,
    back_buffers: Vec<B::Resource>,
    rtv_heap: DescriptorHeap<B>,
    current: u32,
}

impl<B: GraphicsBackend> SwapChain<B> {
    /// 创建交换链、RTV 堆，并为每个后缓冲写入 RTV
    ///
    /// # 参数
    ///
    /// * `device` - 图形设备
    /// * `queue` - 呈现所用的命令队列
    /// * `surface` - 窗口表面
    /// * `desc` - 交换链描述
    pub fn new(
        device: &GraphicsDevice<B>,
        queue: &B::Queue,
        surface: SurfaceHandle,
        desc: SwapChainDescriptor,
    ) -> Result<Self> {
        let raw = device.raw().create_swap_chain(queue, &surface, &desc)?;
        let rtv_heap = DescriptorHeap::new(device, &DescriptorHeapDescriptor::rtv(desc.buffer_count))?;

        let mut swap_chain = Self {
            raw,
            desc,
            surface,
            back_buffers: Vec::with_capacity(desc.buffer_count as usize),
            rtv_heap,
            current: 0,
        };
        swap_chain.acquire_back_buffers(device)?;
        swap_chain.current = swap_chain.query_back_buffer_index()?;

        info!(
            width = desc.width,
            height = desc.height,
            buffers = desc.buffer_count,
            format = ?desc.format,
            "Swap chain created"
        );

        Ok(swap_chain)
    }

    /// 获取每个后缓冲并写入对应槽位的 RTV
    fn acquire_back_buffers(&mut self, device: &GraphicsDevice<B>) -> Result<()> {
        self.back_buffers.clear();
        for index in 0..self.desc.buffer_count {
            let buffer = self.raw.back_buffer(index)?;
            device
                .raw()
                .create_render_target_view(&buffer, self.rtv_heap.handle_at(index)?)?;
            self.back_buffers.push(buffer);
        }
        Ok(())
    }

    fn query_back_buffer_index(&self) -> Result<u32> {
        let index = self.raw.current_back_buffer_index();
        if index >= self.desc.buffer_count {
            return Err(graphics_error(
                GraphicsErrorKind::SwapChain,
                format!(
                    "Back buffer index {} out of range (buffer count {})",
                    index, self.desc.buffer_count
                ),
            ));
        }
        Ok(index)
    }

    /// 当前后缓冲索引
    pub fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    /// 当前后缓冲
    pub fn current_back_buffer(&self) -> Result<&B::Resource> {
        self.back_buffers.get(self.current as usize).ok_or_else(|| {
            graphics_error(
                GraphicsErrorKind::SwapChain,
                format!("Back buffer {} is not acquired", self.current),
            )
        })
    }

    /// 指定索引的后缓冲
    pub fn back_buffer(&self, index: u32) -> Option<&B::Resource> {
        self.back_buffers.get(index as usize)
    }

    /// 当前后缓冲的 RTV
    pub fn current_rtv(&self) -> Result<CpuDescriptorHandle> {
        self.rtv_heap.handle_at(self.current)
    }

    pub fn rtv_heap(&self) -> &DescriptorHeap<B> {
        &self.rtv_heap
    }

    /// 呈现当前后缓冲，然后重新查询后缓冲索引
    ///
    /// # 参数
    ///
    /// * `sync_interval` - 0 表示立即呈现，1 表示等待垂直同步
    pub fn present(&mut self, sync_interval: u32) -> Result<()> {
        self.raw.present(sync_interval)?;
        self.current = self.query_back_buffer_index()?;

        trace!(back_buffer = self.current, "Presented");
        Ok(())
    }

    /// 调整后缓冲大小
    ///
    /// 调用前 GPU 必须已经完成对所有后缓冲的使用。
    pub fn resize(&mut self, device: &GraphicsDevice<B>, width: u32, height: u32) -> Result<()> {
        // 原生调整大小要求没有任何后缓冲引用
        self.back_buffers.clear();

        self.raw
            .resize_buffers(self.desc.buffer_count, width, height, self.desc.format)?;
        self.desc.width = width;
        self.desc.height = height;

        self.acquire_back_buffers(device)?;
        self.current = self.query_back_buffer_index()?;

        debug!(width, height, "Swap chain resized");
        Ok(())
    }

    pub fn raw(&self) -> &B::SwapChain {
        &self.raw
    }

    pub fn descriptor(&self) -> &SwapChainDescriptor {
        &self.desc
    }

    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    pub fn buffer_count(&self) -> u32 {
        self.desc.buffer_count
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{test_device, Headless, HeadlessInstance, ViewKind};
    use crate::renderer::device::DeviceOptions;

    fn create(device: &GraphicsDevice<Headless>, desc: SwapChainDescriptor) -> SwapChain<Headless> {
        let queue = device.raw().create_command_queue().unwrap();
        SwapChain::new(device, &queue, SurfaceHandle::detached(), desc).unwrap()
    }

    #[test]
    fn test_default_descriptor() {
        let desc = SwapChainDescriptor::new(1280, 768);
        assert_eq!(desc.format, PixelFormat::Rgba8Unorm);
        assert_eq!(desc.buffer_count, 2);
        assert_eq!(desc.refresh_rate, RefreshRate { numerator: 60, denominator: 1 });
        assert_eq!(desc.sample_desc, SampleDesc { count: 1, quality: 0 });
    }

    #[test]
    fn test_two_buffers_two_rtvs() {
        let device = test_device(false);
        let swap_chain = create(&device, SwapChainDescriptor::new(1280, 768));

        assert_eq!(swap_chain.buffer_count(), 2);
        assert!(swap_chain.back_buffer(0).is_some());
        assert!(swap_chain.back_buffer(1).is_some());
        assert!(swap_chain.back_buffer(2).is_none());
        assert!(swap_chain.current_back_buffer_index() < 2);

        let views = device.raw().written_views();
        let rtvs: Vec<_> = views.iter().filter(|v| v.kind == ViewKind::RenderTarget).collect();
        assert_eq!(rtvs.len(), 2);
        assert_eq!(rtvs[0].handle, swap_chain.rtv_heap().handle_at(0).unwrap().ptr);
        assert_eq!(rtvs[1].handle, swap_chain.rtv_heap().handle_at(1).unwrap().ptr);
        assert_ne!(rtvs[0].resource, rtvs[1].resource);
    }

    #[test]
    fn test_back_buffer_index_cycles_across_presents() {
        for (buffer_count, initial) in [(2u32, 1u32), (3, 0), (4, 2)] {
            let instance = HeadlessInstance::default().with_initial_back_buffer(initial);
            let device = GraphicsDevice::<Headless>::create(&instance, &DeviceOptions::default()).unwrap();
            let mut swap_chain = create(
                &device,
                SwapChainDescriptor::new(320, 240).with_buffer_count(buffer_count),
            );
            assert_eq!(swap_chain.current_back_buffer_index(), initial);

            for k in 1..=10u32 {
                swap_chain.present(1).unwrap();
                assert_eq!(swap_chain.current_back_buffer_index(), (initial + k) % buffer_count);
            }
            assert_eq!(swap_chain.raw().present_count(), 10);
        }
    }

    #[test]
    fn test_resize_reacquires_buffers() {
        let device = test_device(false);
        let mut swap_chain = create(&device, SwapChainDescriptor::new(1280, 768));
        let old = swap_chain.back_buffer(0).unwrap().id();

        swap_chain.resize(&device, 800, 600).unwrap();
        assert_eq!(swap_chain.size(), (800, 600));
        assert_ne!(swap_chain.back_buffer(0).unwrap().id(), old);
        assert_eq!(swap_chain.back_buffer(0).unwrap().size(), (800, 600));
        assert_eq!(swap_chain.current_back_buffer_index(), 0);
        // 两次各写入 2 个 RTV
        assert_eq!(device.raw().written_views().len(), 4);
    }

    #[test]
    fn test_resize_fails_with_outstanding_reference() {
        let device = test_device(false);
        let mut swap_chain = create(&device, SwapChainDescriptor::new(1280, 768));

        // 外部持有后缓冲时，原生调整大小失败
        let _held = swap_chain.back_buffer(1).cloned();
        let err = swap_chain.resize(&device, 640, 480).unwrap_err();
        assert_eq!(err.graphics_kind(), Some(GraphicsErrorKind::SwapChain));
    }

    #[test]
    fn test_present_failure_propagates() {
        let device = test_device(false);
        let mut swap_chain = create(&device, SwapChainDescriptor::new(64, 64));
        swap_chain.raw().fail_next_present();

        let err = swap_chain.present(1).unwrap_err();
        assert_eq!(err.graphics_kind(), Some(GraphicsErrorKind::Presentation));
        assert!(err.to_string().contains("[CODE]: 0x887A0005"));
    }
}
