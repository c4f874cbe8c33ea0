//! 图形后端的统一抽象接口
//!
//! 本模块定义了所有图形后端（DirectX 12、Headless）必须实现的统一接口。
//! 上层的设备解析、同步、命令提交、描述符堆、交换链和帧控制逻辑只依赖这些 trait，
//! 不直接接触原生 API。
//!
//! # 设计原则
//!
//! - **薄封装**：每个方法对应一次原生调用，不在后端中做状态管理
//! - **错误即致命**：原生调用失败时返回带有状态码的 `GraphicsError`
//! - **所有权**：原生对象由实现类型持有，`Drop` 时释放

use raw_window_handle::{HasWindowHandle, RawWindowHandle};

use crate::core::error::{DistGfxError, Result};
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorType};
use crate::renderer::device::{AdapterInfo, FeatureLevel};
use crate::renderer::resource::{PixelFormat, ResourceState, ScissorRect, Viewport};
use crate::renderer::swapchain::SwapChainDescriptor;

/// 图形后端
///
/// 只用作类型族，把一个后端的所有原生对象类型绑在一起。
pub trait GraphicsBackend: Sized + 'static {
    type Instance: RawInstance<Self>;
    type Adapter;
    type Device: RawDevice<Self>;
    type Queue: RawQueue<Self>;
    type Fence: RawFence;
    type CommandAllocator: RawCommandAllocator;
    type CommandList: RawCommandList<Self>;
    type DescriptorHeap: RawDescriptorHeap;
    type SwapChain: RawSwapChain<Self>;
    /// GPU 资源（后缓冲、深度缓冲），克隆只增加引用
    type Resource: Clone;

    /// 后端名称，用于日志输出
    fn name() -> &'static str;
}

/// 适配器枚举和设备创建（DXGI 工厂）
pub trait RawInstance<B: GraphicsBackend> {
    /// 按驱动报告的顺序枚举适配器
    fn enumerate_adapters(&self) -> Result<Vec<(AdapterInfo, B::Adapter)>>;

    /// 平台提供的软件适配器（WARP）
    fn software_adapter(&self) -> Result<(AdapterInfo, B::Adapter)>;

    /// 适配器是否能以指定特性级别创建设备（只探测，不创建）
    fn supports_feature_level(&self, adapter: &B::Adapter, level: FeatureLevel) -> bool;

    /// 在适配器上创建设备
    fn create_device(&self, adapter: &B::Adapter, min_level: FeatureLevel) -> Result<B::Device>;
}

/// 逻辑设备
pub trait RawDevice<B: GraphicsBackend> {
    /// 从降序候选列表中返回第一个受支持的特性级别
    fn max_supported_feature_level(&self, candidates: &[FeatureLevel]) -> Result<FeatureLevel>;

    /// MSAA 质量级别数量
    fn msaa_quality_levels(&self, format: PixelFormat, sample_count: u32) -> Result<u32>;

    /// 创建 Direct 类型的命令队列
    fn create_command_queue(&self) -> Result<B::Queue>;

    fn create_fence(&self, initial_value: u64) -> Result<B::Fence>;

    fn create_command_allocator(&self) -> Result<B::CommandAllocator>;

    /// 创建命令列表，返回时处于录制状态
    fn create_command_list(&self, allocator: &B::CommandAllocator) -> Result<B::CommandList>;

    /// 创建 CPU 可见（非着色器可见）的描述符堆
    fn create_descriptor_heap(&self, ty: DescriptorType, count: u32) -> Result<B::DescriptorHeap>;

    /// 指定堆类型的描述符步长（字节）
    fn descriptor_increment_size(&self, ty: DescriptorType) -> u32;

    fn create_render_target_view(
        &self,
        resource: &B::Resource,
        handle: CpuDescriptorHandle,
    ) -> Result<()>;

    /// 创建默认堆上的深度模板纹理，初始状态为 `DepthWrite`，清除值为 1.0 / 0
    fn create_depth_stencil_buffer(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<B::Resource>;

    fn create_depth_stencil_view(
        &self,
        resource: &B::Resource,
        format: PixelFormat,
        handle: CpuDescriptorHandle,
    ) -> Result<()>;

    /// 创建绑定到窗口表面的交换链
    fn create_swap_chain(
        &self,
        queue: &B::Queue,
        surface: &SurfaceHandle,
        desc: &SwapChainDescriptor,
    ) -> Result<B::SwapChain>;
}

/// 命令队列
pub trait RawQueue<B: GraphicsBackend> {
    /// 按顺序提交已关闭的命令列表
    fn execute_command_lists(&self, lists: &[&B::CommandList]) -> Result<()>;

    /// 在队列中排入一次 fence 写入，位于之前提交的所有工作之后
    fn signal(&self, fence: &B::Fence, value: u64) -> Result<()>;
}

/// GPU fence
pub trait RawFence {
    /// GPU 已写入的最新值
    fn completed_value(&self) -> u64;

    /// 阻塞当前线程直到 GPU 写入 `value`
    fn wait_for_completion(&self, value: u64) -> Result<()>;
}

/// 命令分配器
pub trait RawCommandAllocator {
    /// 回收分配器内存，调用前 GPU 必须已完成其上的全部命令
    fn reset(&self) -> Result<()>;
}

/// 图形命令列表
///
/// 录制类方法对应原生 API 中没有返回值的调用。
pub trait RawCommandList<B: GraphicsBackend> {
    fn reset(&self, allocator: &B::CommandAllocator) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn resource_barrier(&self, resource: &B::Resource, before: ResourceState, after: ResourceState);

    fn set_viewport_and_scissor(&self, viewport: &Viewport, scissor: &ScissorRect);

    fn set_render_target(&self, rtv: CpuDescriptorHandle, dsv: Option<CpuDescriptorHandle>);

    fn clear_render_target(&self, rtv: CpuDescriptorHandle, color: [f32; 4]);

    fn clear_depth_stencil(&self, dsv: CpuDescriptorHandle, depth: f32, stencil: u8);
}

/// 描述符堆
pub trait RawDescriptorHeap {
    /// 堆起始 CPU 句柄的指针值
    fn cpu_start(&self) -> usize;
}

/// 原生交换链
pub trait RawSwapChain<B: GraphicsBackend> {
    fn current_back_buffer_index(&self) -> u32;

    fn back_buffer(&self, index: u32) -> Result<B::Resource>;

    /// 呈现当前后缓冲，不等待 GPU 完成
    fn present(&self, sync_interval: u32) -> Result<()>;

    /// 调整缓冲大小，调用前必须释放所有后缓冲引用
    fn resize_buffers(&self, count: u32, width: u32, height: u32, format: PixelFormat) -> Result<()>;
}

/// 窗口表面句柄
///
/// 交换链存活期间不变。不绑定窗口的表面只能用于 Headless 后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle {
    window: Option<RawWindowHandle>,
}

impl SurfaceHandle {
    /// 从窗口获取表面句柄
    pub fn from_window(window: &impl HasWindowHandle) -> Result<Self> {
        let handle = window.window_handle().map_err(|e| {
            DistGfxError::Initialization(format!("Failed to get window handle: {}", e))
        })?;
        Ok(Self {
            window: Some(handle.as_raw()),
        })
    }

    /// 不绑定窗口的表面
    pub fn detached() -> Self {
        Self { window: None }
    }

    /// 原始窗口句柄
    pub fn raw(&self) -> Option<RawWindowHandle> {
        self.window
    }
}
