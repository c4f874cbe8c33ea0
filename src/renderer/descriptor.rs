//! 描述符管理模块
//!
//! 固定大小的 CPU 描述符堆（RTV、DSV），按 `起始地址 + 索引 * 步长` 计算句柄。
//!
//! # 设计原则
//!
//! - **步长来自设备**：每种堆类型的步长在创建堆时向设备查询，不做假设
//! - **边界检查**：所有访问都满足 `index < capacity`
//! - **RAII**：原生堆随 `DescriptorHeap` 一起释放
//!
//! # DirectX 12 描述符类型
//!
//! - **RTV** (Render Target View)：渲染目标视图，每个后缓冲一个
//! - **DSV** (Depth Stencil View)：深度模板视图，深度缓冲独占一个堆
//! - **CBV/SRV/UAV**、**Sampler**：着色器可见的堆，本子系统只查询其步长

use tracing::debug;

use crate::core::error::{graphics_error, GraphicsErrorKind, Result};
use crate::gfx::backend::{GraphicsBackend, RawDescriptorHeap, RawDevice};
use crate::renderer::device::GraphicsDevice;

/// 描述符类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// 渲染目标视图 (RTV)
    RenderTargetView,
    /// 深度模板视图 (DSV)
    DepthStencilView,
    /// 常量缓冲/着色资源/无序访问视图
    CbvSrvUav,
    /// 采样器
    Sampler,
}

impl DescriptorType {
    /// 获取描述符类型名称
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorType::RenderTargetView => "RTV",
            DescriptorType::DepthStencilView => "DSV",
            DescriptorType::CbvSrvUav => "CBV/SRV/UAV",
            DescriptorType::Sampler => "Sampler",
        }
    }
}

/// 描述符堆描述信息
#[derive(Debug, Clone)]
pub struct DescriptorHeapDescriptor {
    /// 描述符类型
    pub descriptor_type: DescriptorType,
    /// 描述符数量
    pub num_descriptors: u32,
    /// 调试名称
    pub name: Option<String>,
}

impl DescriptorHeapDescriptor {
    /// 创建新的描述符堆描述符
    pub fn new(descriptor_type: DescriptorType, num_descriptors: u32) -> Self {
        Self {
            descriptor_type,
            num_descriptors,
            name: None,
        }
    }

    /// 设置调试名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 创建 RTV 堆描述符
    pub fn rtv(num_descriptors: u32) -> Self {
        Self::new(DescriptorType::RenderTargetView, num_descriptors)
            .with_name("RTV Heap")
    }

    /// 创建 DSV 堆描述符
    pub fn dsv(num_descriptors: u32) -> Self {
        Self::new(DescriptorType::DepthStencilView, num_descriptors)
            .with_name("DSV Heap")
    }
}

/// 描述符句柄（CPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: usize,
    /// 描述符索引
    pub index: u32,
}

impl CpuDescriptorHandle {
    /// 创建新的 CPU 描述符句柄
    pub fn new(ptr: usize, index: u32) -> Self {
        Self { ptr, index }
    }

    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + count as usize * increment_size as usize,
            index: self.index + count,
        }
    }
}

/// 描述符堆
pub struct DescriptorHeap<B: GraphicsBackend> {
    raw: B::DescriptorHeap,
    descriptor_type: DescriptorType,
    capacity: u32,
    increment_size: u32,
    cpu_start: CpuDescriptorHandle,
}

impl<B: GraphicsBackend> DescriptorHeap<B> {
    /// 创建描述符堆并查询该类型的步长
    pub fn new(device: &GraphicsDevice<B>, desc: &DescriptorHeapDescriptor) -> Result<Self> {
        if desc.num_descriptors == 0 {
            return Err(graphics_error(
                GraphicsErrorKind::Descriptor,
                format!("{} heap must hold at least one descriptor", desc.descriptor_type.name()),
            ));
        }

        let raw = device
            .raw()
            .create_descriptor_heap(desc.descriptor_type, desc.num_descriptors)?;
        let increment_size = device.raw().descriptor_increment_size(desc.descriptor_type);
        let cpu_start = CpuDescriptorHandle::new(raw.cpu_start(), 0);

        #[cfg(debug_assertions)]
        debug!(
            heap = desc.name.as_deref().unwrap_or(desc.descriptor_type.name()),
            capacity = desc.num_descriptors,
            increment_size,
            "Descriptor heap created"
        );

        Ok(Self {
            raw,
            descriptor_type: desc.descriptor_type,
            capacity: desc.num_descriptors,
            increment_size,
            cpu_start,
        })
    }

    /// 第 `index` 个描述符的 CPU 句柄
    pub fn handle_at(&self, index: u32) -> Result<CpuDescriptorHandle> {
        if index >= self.capacity {
            return Err(graphics_error(
                GraphicsErrorKind::Descriptor,
                format!(
                    "{} descriptor index {} out of range (capacity {})",
                    self.descriptor_type.name(),
                    index,
                    self.capacity
                ),
            ));
        }

        Ok(self.cpu_start.offset(index, self.increment_size))
    }

    pub fn raw(&self) -> &B::DescriptorHeap {
        &self.raw
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.descriptor_type
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 设备报告的步长（字节）
    pub fn increment_size(&self) -> u32 {
        self.increment_size
    }

    pub fn cpu_start(&self) -> CpuDescriptorHandle {
        self.cpu_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{test_device, Headless};

    #[test]
    fn test_handle_offset() {
        let handle = CpuDescriptorHandle::new(1000, 0);
        let next = handle.offset(3, 32);
        assert_eq!(next.ptr, 1096);
        assert_eq!(next.index, 3);
    }

    #[test]
    fn test_handles_are_spaced_by_device_increment() {
        let device = test_device(false);

        for (desc, count) in [
            (DescriptorHeapDescriptor::rtv(8), 8u32),
            (DescriptorHeapDescriptor::dsv(3), 3),
            (DescriptorHeapDescriptor::new(DescriptorType::Sampler, 4), 4),
        ] {
            let ty = desc.descriptor_type;
            let heap = DescriptorHeap::<Headless>::new(&device, &desc).unwrap();
            let increment = device.raw().descriptor_increment_size(ty);
            assert_eq!(heap.increment_size(), increment);

            let handles: Vec<_> = (0..count).map(|i| heap.handle_at(i).unwrap()).collect();
            assert_eq!(handles[0], heap.cpu_start());
            for pair in handles.windows(2) {
                assert!(pair[1].ptr > pair[0].ptr);
                assert_eq!(pair[1].ptr - pair[0].ptr, increment as usize);
            }
        }
    }

    #[test]
    fn test_increment_differs_per_type() {
        let device = test_device(false);
        let rtv = device.raw().descriptor_increment_size(DescriptorType::RenderTargetView);
        let dsv = device.raw().descriptor_increment_size(DescriptorType::DepthStencilView);
        assert_ne!(rtv, dsv);
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let device = test_device(false);
        let heap = DescriptorHeap::<Headless>::new(&device, &DescriptorHeapDescriptor::rtv(2)).unwrap();
        assert!(heap.handle_at(1).is_ok());
        let err = heap.handle_at(2).unwrap_err();
        assert_eq!(err.graphics_kind(), Some(GraphicsErrorKind::Descriptor));
    }

    #[test]
    fn test_empty_heap_rejected() {
        let device = test_device(false);
        let result = DescriptorHeap::<Headless>::new(&device, &DescriptorHeapDescriptor::dsv(0));
        assert!(result.is_err());
    }
}
