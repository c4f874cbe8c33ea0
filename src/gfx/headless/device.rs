//! 模拟的适配器、实例和设备

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::gpu::HeadlessGpu;
use super::queue::{HeadlessCommandAllocator, HeadlessCommandList, HeadlessFence, HeadlessQueue};
use super::swapchain::{HeadlessResource, HeadlessSwapChain, ResourceKind};
use super::{lock, native_error, Headless, DXGI_ERROR_INVALID_CALL, DXGI_ERROR_UNSUPPORTED, E_FAIL, E_INVALIDARG};
use crate::core::error::{GraphicsErrorKind, Result};
use crate::gfx::backend::{RawDescriptorHeap, RawDevice, RawInstance, SurfaceHandle};
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorType};
use crate::renderer::device::{AdapterInfo, FeatureLevel};
use crate::renderer::resource::PixelFormat;
use crate::renderer::swapchain::SwapChainDescriptor;

/// 模拟适配器
#[derive(Debug, Clone)]
pub struct HeadlessAdapter {
    pub description: String,
    pub max_feature_level: FeatureLevel,
    pub software: bool,
    pub vendor_id: u32,
    pub device_id: u32,
    pub dedicated_video_memory: u64,
}

impl HeadlessAdapter {
    /// 硬件适配器
    pub fn hardware(description: impl Into<String>, max_feature_level: FeatureLevel) -> Self {
        Self {
            description: description.into(),
            max_feature_level,
            software: false,
            vendor_id: 0x10DE,
            device_id: 0x2684,
            dedicated_video_memory: 4 << 30,
        }
    }

    /// 软件适配器
    pub fn software(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            max_feature_level: FeatureLevel::Level12_1,
            software: true,
            vendor_id: 0x1414,
            device_id: 0x008C,
            dedicated_video_memory: 0,
        }
    }

    fn info(&self, index: u32) -> AdapterInfo {
        AdapterInfo {
            index,
            vendor_id: self.vendor_id,
            device_id: self.device_id,
            description: self.description.clone(),
            dedicated_video_memory: self.dedicated_video_memory,
            software: self.software,
        }
    }
}

/// 模拟实例（对应 DXGI 工厂）
#[derive(Debug, Clone)]
pub struct HeadlessInstance {
    adapters: Vec<HeadlessAdapter>,
    warp: HeadlessAdapter,
    deferred: bool,
    initial_back_buffer: u32,
    fail_device_creation: bool,
}

impl Default for HeadlessInstance {
    /// 一个 12_1 硬件适配器，加上驱动枚举出的软件适配器
    fn default() -> Self {
        Self::new(vec![
            HeadlessAdapter::hardware("Headless GPU", FeatureLevel::Level12_1),
            HeadlessAdapter::software("Microsoft Basic Render Driver"),
        ])
    }
}

impl HeadlessInstance {
    pub fn new(adapters: Vec<HeadlessAdapter>) -> Self {
        Self {
            adapters,
            warp: HeadlessAdapter::software("Headless WARP Adapter"),
            deferred: false,
            initial_back_buffer: 0,
            fail_device_creation: false,
        }
    }

    /// 队列上的工作只在 CPU 等待或显式 `retire` 时完成
    pub fn with_deferred_completion(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// 新建交换链的初始后缓冲索引（对缓冲数量取模）
    pub fn with_initial_back_buffer(mut self, index: u32) -> Self {
        self.initial_back_buffer = index;
        self
    }

    /// 所有设备创建都失败
    pub fn fail_device_creation(mut self) -> Self {
        self.fail_device_creation = true;
        self
    }
}

impl RawInstance<Headless> for HeadlessInstance {
    fn enumerate_adapters(&self) -> Result<Vec<(AdapterInfo, HeadlessAdapter)>> {
        Ok(self
            .adapters
            .iter()
            .enumerate()
            .map(|(i, adapter)| (adapter.info(i as u32), adapter.clone()))
            .collect())
    }

    fn software_adapter(&self) -> Result<(AdapterInfo, HeadlessAdapter)> {
        Ok((self.warp.info(self.adapters.len() as u32), self.warp.clone()))
    }

    fn supports_feature_level(&self, adapter: &HeadlessAdapter, level: FeatureLevel) -> bool {
        !self.fail_device_creation && level <= adapter.max_feature_level
    }

    fn create_device(&self, adapter: &HeadlessAdapter, min_level: FeatureLevel) -> Result<HeadlessDevice> {
        if self.fail_device_creation {
            return Err(native_error(
                GraphicsErrorKind::DeviceCreation,
                E_FAIL,
                format!("D3D12CreateDevice failed on '{}'", adapter.description),
            ));
        }

        if min_level > adapter.max_feature_level {
            return Err(native_error(
                GraphicsErrorKind::DeviceCreation,
                DXGI_ERROR_UNSUPPORTED,
                format!(
                    "'{}' does not support feature level {}",
                    adapter.description,
                    min_level.name()
                ),
            ));
        }

        Ok(HeadlessDevice {
            max_feature_level: adapter.max_feature_level,
            gpu: HeadlessGpu::new(self.deferred),
            initial_back_buffer: self.initial_back_buffer,
            ids: Arc::new(AtomicU64::new(1)),
            state: Mutex::new(DeviceState {
                heaps: Vec::new(),
                views: Vec::new(),
                next_heap_base: HEAP_BASE,
            }),
        })
    }
}

/// 视图类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    RenderTarget,
    DepthStencil,
}

/// 写入描述符堆的视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenView {
    pub kind: ViewKind,
    /// CPU 句柄的指针值
    pub handle: usize,
    /// 资源 ID
    pub resource: u64,
}

struct HeapRange {
    ty: DescriptorType,
    start: usize,
    count: u32,
    increment: u32,
}

struct DeviceState {
    heaps: Vec<HeapRange>,
    views: Vec<WrittenView>,
    next_heap_base: usize,
}

const HEAP_BASE: usize = 0x1_0000;
const HEAP_GAP: usize = 0x1000;

/// 模拟设备
pub struct HeadlessDevice {
    max_feature_level: FeatureLevel,
    gpu: HeadlessGpu,
    initial_back_buffer: u32,
    ids: Arc<AtomicU64>,
    state: Mutex<DeviceState>,
}

impl HeadlessDevice {
    /// 设备的 GPU 时间线
    pub fn gpu(&self) -> &HeadlessGpu {
        &self.gpu
    }

    /// 按写入顺序返回所有视图
    pub fn written_views(&self) -> Vec<WrittenView> {
        lock(&self.state).views.clone()
    }

    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    /// 句柄必须落在指定类型的某个堆内，并对齐到步长
    fn write_view(&self, ty: DescriptorType, kind: ViewKind, resource: &HeadlessResource, handle: CpuDescriptorHandle) -> Result<()> {
        let mut state = lock(&self.state);
        let valid = state.heaps.iter().any(|heap| {
            heap.ty == ty
                && handle.ptr >= heap.start
                && handle.ptr < heap.start + heap.count as usize * heap.increment as usize
                && (handle.ptr - heap.start) % heap.increment as usize == 0
        });

        if !valid {
            return Err(native_error(
                GraphicsErrorKind::Descriptor,
                E_INVALIDARG,
                format!("Handle {:#x} is not a slot of any {} heap", handle.ptr, ty.name()),
            ));
        }

        state.views.push(WrittenView {
            kind,
            handle: handle.ptr,
            resource: resource.id(),
        });
        Ok(())
    }
}

impl RawDevice<Headless> for HeadlessDevice {
    fn max_supported_feature_level(&self, candidates: &[FeatureLevel]) -> Result<FeatureLevel> {
        candidates
            .iter()
            .copied()
            .find(|level| *level <= self.max_feature_level)
            .ok_or_else(|| {
                native_error(
                    GraphicsErrorKind::DeviceCreation,
                    DXGI_ERROR_UNSUPPORTED,
                    "No candidate feature level is supported",
                )
            })
    }

    fn msaa_quality_levels(&self, _format: PixelFormat, sample_count: u32) -> Result<u32> {
        Ok(match sample_count {
            1 | 2 | 4 | 8 => 1,
            _ => 0,
        })
    }

    fn create_command_queue(&self) -> Result<HeadlessQueue> {
        Ok(HeadlessQueue::new(self.gpu.clone()))
    }

    fn create_fence(&self, initial_value: u64) -> Result<HeadlessFence> {
        Ok(HeadlessFence::new(initial_value, self.gpu.clone()))
    }

    fn create_command_allocator(&self) -> Result<HeadlessCommandAllocator> {
        Ok(HeadlessCommandAllocator::new(self.next_id(), self.gpu.clone()))
    }

    fn create_command_list(&self, allocator: &HeadlessCommandAllocator) -> Result<HeadlessCommandList> {
        Ok(HeadlessCommandList::new(allocator.id()))
    }

    fn create_descriptor_heap(&self, ty: DescriptorType, count: u32) -> Result<HeadlessDescriptorHeap> {
        if count == 0 {
            return Err(native_error(
                GraphicsErrorKind::Descriptor,
                E_INVALIDARG,
                "Descriptor heap with zero descriptors",
            ));
        }

        let increment = self.descriptor_increment_size(ty);
        let mut state = lock(&self.state);
        let start = state.next_heap_base;
        state.next_heap_base += count as usize * increment as usize + HEAP_GAP;
        state.heaps.push(HeapRange { ty, start, count, increment });

        Ok(HeadlessDescriptorHeap { start })
    }

    fn descriptor_increment_size(&self, ty: DescriptorType) -> u32 {
        match ty {
            DescriptorType::RenderTargetView => 32,
            DescriptorType::DepthStencilView => 8,
            DescriptorType::CbvSrvUav => 64,
            DescriptorType::Sampler => 16,
        }
    }

    fn create_render_target_view(&self, resource: &HeadlessResource, handle: CpuDescriptorHandle) -> Result<()> {
        self.write_view(DescriptorType::RenderTargetView, ViewKind::RenderTarget, resource, handle)
    }

    fn create_depth_stencil_buffer(&self, width: u32, height: u32, format: PixelFormat) -> Result<HeadlessResource> {
        if !format.is_depth() || width == 0 || height == 0 {
            return Err(native_error(
                GraphicsErrorKind::ResourceCreation,
                E_INVALIDARG,
                format!("Invalid depth stencil buffer {}x{} {:?}", width, height, format),
            ));
        }

        Ok(HeadlessResource::new(
            self.next_id(),
            ResourceKind::DepthStencil,
            width,
            height,
            format,
        ))
    }

    fn create_depth_stencil_view(
        &self,
        resource: &HeadlessResource,
        _format: PixelFormat,
        handle: CpuDescriptorHandle,
    ) -> Result<()> {
        self.write_view(DescriptorType::DepthStencilView, ViewKind::DepthStencil, resource, handle)
    }

    fn create_swap_chain(
        &self,
        _queue: &HeadlessQueue,
        _surface: &SurfaceHandle,
        desc: &SwapChainDescriptor,
    ) -> Result<HeadlessSwapChain> {
        if !(2..=16).contains(&desc.buffer_count)
            || desc.sample_desc.count != 1
            || desc.width == 0
            || desc.height == 0
        {
            return Err(native_error(
                GraphicsErrorKind::SwapChain,
                DXGI_ERROR_INVALID_CALL,
                format!("Invalid swap chain description {:?}", desc),
            ));
        }

        Ok(HeadlessSwapChain::new(
            desc,
            self.initial_back_buffer % desc.buffer_count,
            Arc::clone(&self.ids),
        ))
    }
}

/// 模拟描述符堆
pub struct HeadlessDescriptorHeap {
    start: usize,
}

impl RawDescriptorHeap for HeadlessDescriptorHeap {
    fn cpu_start(&self) -> usize {
        self.start
    }
}
