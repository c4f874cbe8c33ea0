//! 资源管理模块
//!
//! 像素格式、资源状态、视口/裁剪矩形、深度模板缓冲，以及按后缓冲划分的帧资源。
//!
//! # 设计原则
//!
//! - **生命周期管理**：使用Rust所有权系统自动管理资源生命周期
//! - **按需重建**：深度缓冲和视口在窗口大小变化时整体重建
//! - **帧资源**：每个后缓冲记录最后一次提交的 fence 值，复用前等待

use tracing::debug;

use crate::core::error::{graphics_error, GraphicsErrorKind, Result};
use crate::gfx::backend::{GraphicsBackend, RawDevice};
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeap, DescriptorHeapDescriptor};
use crate::renderer::device::GraphicsDevice;
use crate::renderer::sync::FenceValue;

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA 8位无符号归一化（后缓冲默认格式）
    Rgba8Unorm,
    /// BGRA 8位无符号归一化
    Bgra8Unorm,
    /// 深度 32位浮点
    Depth32Float,
    /// 深度 24位 + 模板 8位
    Depth24UnormStencil8,
}

impl PixelFormat {
    /// 是否为深度格式
    pub fn is_depth(&self) -> bool {
        matches!(self, PixelFormat::Depth32Float | PixelFormat::Depth24UnormStencil8)
    }
}

/// 资源状态（屏障转换使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Common,
    /// 交换链缓冲等待呈现
    Present,
    RenderTarget,
    DepthWrite,
}

/// 视口
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// 覆盖整个表面的视口，深度范围 [0, 1]
    pub fn for_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 裁剪矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    /// 覆盖整个表面的裁剪矩形
    pub fn for_size(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }
}

/// 深度模板缓冲
///
/// 一个深度纹理加一个只有一个槽位的 DSV 堆，视图位于槽位 0。
pub struct DepthStencilBuffer<B: GraphicsBackend> {
    resource: B::Resource,
    heap: DescriptorHeap<B>,
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl<B: GraphicsBackend> DepthStencilBuffer<B> {
    /// 创建深度缓冲和它的 DSV
    pub fn new(device: &GraphicsDevice<B>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if !format.is_depth() {
            return Err(graphics_error(
                GraphicsErrorKind::ResourceCreation,
                format!("{:?} is not a depth format", format),
            ));
        }

        let heap = DescriptorHeap::new(device, &DescriptorHeapDescriptor::dsv(1))?;
        let resource = Self::create_resource(device, &heap, width, height, format)?;

        Ok(Self {
            resource,
            heap,
            format,
            width,
            height,
        })
    }

    /// 按新尺寸重建深度纹理，并重写槽位 0 的 DSV
    pub fn recreate(&mut self, device: &GraphicsDevice<B>, width: u32, height: u32) -> Result<()> {
        self.resource = Self::create_resource(device, &self.heap, width, height, self.format)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn create_resource(
        device: &GraphicsDevice<B>,
        heap: &DescriptorHeap<B>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<B::Resource> {
        let resource = device.raw().create_depth_stencil_buffer(width, height, format)?;
        device
            .raw()
            .create_depth_stencil_view(&resource, format, heap.handle_at(0)?)?;

        #[cfg(debug_assertions)]
        debug!(width, height, format = ?format, "Depth stencil buffer created");

        Ok(resource)
    }

    pub fn resource(&self) -> &B::Resource {
        &self.resource
    }

    /// DSV 句柄（槽位 0）
    pub fn dsv(&self) -> CpuDescriptorHandle {
        self.heap.cpu_start()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// 帧资源
///
/// 每个后缓冲一个，记录最后一次提交的 fence 值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameResource {
    /// 帧索引
    pub frame_index: usize,
    /// Fence值，用于同步
    pub fence_value: FenceValue,
    /// 资源是否可用
    pub available: bool,
}

impl FrameResource {
    /// 创建新的帧资源
    pub fn new(frame_index: usize) -> Self {
        Self {
            frame_index,
            fence_value: FenceValue::default(),
            available: true,
        }
    }

    /// 标记为不可用（GPU正在使用）
    pub fn mark_in_use(&mut self, fence_value: FenceValue) {
        self.available = false;
        self.fence_value = fence_value;
    }

    /// 标记为可用
    pub fn mark_available(&mut self) {
        self.available = true;
    }
}

/// 帧资源池
///
/// 按交换链报告的后缓冲索引访问，不自行轮转。
#[derive(Debug, Clone)]
pub struct FrameResourcePool {
    /// 帧资源列表
    resources: Vec<FrameResource>,
}

impl FrameResourcePool {
    /// 创建新的帧资源池
    ///
    /// # 参数
    ///
    /// * `count` - 帧资源数量（等于后缓冲数量，至少为 1）
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                "At least one frame resource is required",
            ));
        }

        Ok(Self {
            resources: (0..count).map(FrameResource::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// 根据索引获取帧资源
    pub fn get(&self, index: usize) -> Option<&FrameResource> {
        self.resources.get(index)
    }

    /// 根据索引获取帧资源的可变引用
    pub fn get_mut(&mut self, index: usize) -> Option<&mut FrameResource> {
        self.resources.get_mut(index)
    }

    /// 复用该帧前需要等待的 fence 值，可直接复用时返回 `None`
    pub fn pending_fence_value(&self, index: usize) -> Option<FenceValue> {
        self.resources
            .get(index)
            .filter(|resource| !resource.available)
            .map(|resource| resource.fence_value)
    }

    /// 根据Fence值更新帧资源可用性
    pub fn update_availability(&mut self, completed: FenceValue) {
        for resource in &mut self.resources {
            if !resource.available && resource.fence_value <= completed {
                resource.mark_available();
            }
        }
    }

    /// 全部标记为可用（队列已刷新）
    pub fn mark_all_available(&mut self) {
        for resource in &mut self.resources {
            resource.mark_available();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameResource> {
        self.resources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{test_device, Headless};

    #[test]
    fn test_viewport_and_scissor_cover_surface() {
        let viewport = Viewport::for_size(1280, 768);
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 768.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let scissor = ScissorRect::for_size(1280, 768);
        assert_eq!((scissor.right, scissor.bottom), (1280, 768));
    }

    #[test]
    fn test_frame_resource_pool() {
        let mut pool = FrameResourcePool::new(2).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.pending_fence_value(0), None);

        pool.get_mut(0).unwrap().mark_in_use(FenceValue::new(1));
        pool.get_mut(1).unwrap().mark_in_use(FenceValue::new(2));
        assert_eq!(pool.pending_fence_value(0), Some(FenceValue::new(1)));

        // GPU 完成到 1
        pool.update_availability(FenceValue::new(1));
        assert_eq!(pool.pending_fence_value(0), None);
        assert_eq!(pool.pending_fence_value(1), Some(FenceValue::new(2)));

        pool.mark_all_available();
        assert!(pool.iter().all(|r| r.available));
        assert!(FrameResourcePool::new(0).is_err());
    }

    #[test]
    fn test_depth_buffer_view_in_slot_zero() {
        let device = test_device(false);
        let depth = DepthStencilBuffer::<Headless>::new(&device, 1280, 768, PixelFormat::Depth24UnormStencil8).unwrap();
        assert_eq!(depth.size(), (1280, 768));
        assert_eq!(depth.dsv().index, 0);

        let views = device.raw().written_views();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].handle, depth.dsv().ptr);
    }

    #[test]
    fn test_depth_buffer_recreate() {
        let device = test_device(false);
        let mut depth = DepthStencilBuffer::<Headless>::new(&device, 640, 480, PixelFormat::Depth32Float).unwrap();
        let old_id = depth.resource().id();

        depth.recreate(&device, 800, 600).unwrap();
        assert_eq!(depth.size(), (800, 600));
        assert_ne!(depth.resource().id(), old_id);
        assert_eq!(device.raw().written_views().len(), 2);
    }

    #[test]
    fn test_color_format_rejected_for_depth() {
        let device = test_device(false);
        assert!(DepthStencilBuffer::<Headless>::new(&device, 64, 64, PixelFormat::Rgba8Unorm).is_err());
    }
}
