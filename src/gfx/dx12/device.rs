//! D3D12 设备

use std::ffi::c_void;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::core::Interface;
use raw_window_handle::RawWindowHandle;

use super::command::{Dx12CommandAllocator, Dx12CommandList, Dx12Fence, Dx12Queue};
use super::descriptor::Dx12DescriptorHeap;
use super::swapchain::Dx12SwapChain;
use super::{d3d_feature_level, dxgi_format, from_d3d_feature_level, heap_type, Dx12, Dx12ResultExt};
use crate::core::error::{graphics_error, GraphicsErrorKind, Result};
use crate::gfx::backend::{RawDevice, SurfaceHandle};
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorType};
use crate::renderer::device::FeatureLevel;
use crate::renderer::resource::PixelFormat;
use crate::renderer::swapchain::SwapChainDescriptor;

/// D3D12 设备
///
/// 同时持有创建它的 DXGI 工厂，交换链需要通过工厂创建。
pub struct Dx12Device {
    device: ID3D12Device,
    factory: IDXGIFactory4,
}

impl Dx12Device {
    pub(super) fn new(device: ID3D12Device, factory: IDXGIFactory4) -> Self {
        Self { device, factory }
    }

    /// 底层 ID3D12Device
    pub fn device(&self) -> &ID3D12Device {
        &self.device
    }
}

fn hwnd(surface: &SurfaceHandle) -> Result<HWND> {
    match surface.raw() {
        Some(RawWindowHandle::Win32(handle)) => Ok(HWND(handle.hwnd.get() as *mut c_void)),
        _ => Err(graphics_error(
            GraphicsErrorKind::SwapChain,
            "DX12 swap chain requires a Win32 window handle",
        )),
    }
}

impl RawDevice<Dx12> for Dx12Device {
    fn max_supported_feature_level(&self, candidates: &[FeatureLevel]) -> Result<FeatureLevel> {
        let requested: Vec<_> = candidates.iter().map(|level| d3d_feature_level(*level)).collect();
        let mut data = D3D12_FEATURE_DATA_FEATURE_LEVELS {
            NumFeatureLevels: requested.len() as u32,
            pFeatureLevelsRequested: requested.as_ptr(),
            ..Default::default()
        };

        unsafe {
            self.device.CheckFeatureSupport(
                D3D12_FEATURE_FEATURE_LEVELS,
                &mut data as *mut _ as *mut c_void,
                std::mem::size_of::<D3D12_FEATURE_DATA_FEATURE_LEVELS>() as u32,
            )
        }
        .graphics(GraphicsErrorKind::DeviceCreation, "CheckFeatureSupport(FEATURE_LEVELS) failed")?;

        from_d3d_feature_level(data.MaxSupportedFeatureLevel).ok_or_else(|| {
            graphics_error(
                GraphicsErrorKind::DeviceCreation,
                format!("Unknown feature level {:#X}", data.MaxSupportedFeatureLevel.0),
            )
        })
    }

    fn msaa_quality_levels(&self, format: PixelFormat, sample_count: u32) -> Result<u32> {
        let mut data = D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS {
            Format: dxgi_format(format),
            SampleCount: sample_count,
            Flags: D3D12_MULTISAMPLE_QUALITY_LEVELS_FLAG_NONE,
            NumQualityLevels: 0,
        };

        unsafe {
            self.device.CheckFeatureSupport(
                D3D12_FEATURE_MULTISAMPLE_QUALITY_LEVELS,
                &mut data as *mut _ as *mut c_void,
                std::mem::size_of::<D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS>() as u32,
            )
        }
        .graphics(
            GraphicsErrorKind::DeviceCreation,
            "CheckFeatureSupport(MULTISAMPLE_QUALITY_LEVELS) failed",
        )?;

        Ok(data.NumQualityLevels)
    }

    fn create_command_queue(&self) -> Result<Dx12Queue> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            ..Default::default()
        };
        let queue: ID3D12CommandQueue = unsafe { self.device.CreateCommandQueue(&desc) }
            .graphics(GraphicsErrorKind::DeviceCreation, "CreateCommandQueue failed")?;
        Ok(Dx12Queue::new(queue))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Dx12Fence> {
        let fence: ID3D12Fence = unsafe { self.device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }
            .graphics(GraphicsErrorKind::Synchronization, "CreateFence failed")?;
        Ok(Dx12Fence::new(fence))
    }

    fn create_command_allocator(&self) -> Result<Dx12CommandAllocator> {
        let allocator: ID3D12CommandAllocator =
            unsafe { self.device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT) }
                .graphics(GraphicsErrorKind::CommandExecution, "CreateCommandAllocator failed")?;
        Ok(Dx12CommandAllocator::new(allocator))
    }

    fn create_command_list(&self, allocator: &Dx12CommandAllocator) -> Result<Dx12CommandList> {
        let list: ID3D12GraphicsCommandList = unsafe {
            self.device.CreateCommandList(
                0,
                D3D12_COMMAND_LIST_TYPE_DIRECT,
                allocator.raw(),
                None::<&ID3D12PipelineState>,
            )
        }
        .graphics(GraphicsErrorKind::CommandExecution, "CreateCommandList failed")?;
        Ok(Dx12CommandList::new(list))
    }

    fn create_descriptor_heap(&self, ty: DescriptorType, count: u32) -> Result<Dx12DescriptorHeap> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type(ty),
            NumDescriptors: count,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
            NodeMask: 0,
        };
        let heap: ID3D12DescriptorHeap = unsafe { self.device.CreateDescriptorHeap(&desc) }.graphics(
            GraphicsErrorKind::Descriptor,
            &format!("Failed to create {} descriptor heap", ty.name()),
        )?;
        Ok(Dx12DescriptorHeap::new(heap))
    }

    fn descriptor_increment_size(&self, ty: DescriptorType) -> u32 {
        unsafe { self.device.GetDescriptorHandleIncrementSize(heap_type(ty)) }
    }

    fn create_render_target_view(&self, resource: &ID3D12Resource, handle: CpuDescriptorHandle) -> Result<()> {
        unsafe {
            self.device.CreateRenderTargetView(
                resource,
                None,
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr },
            );
        }
        Ok(())
    }

    fn create_depth_stencil_buffer(&self, width: u32, height: u32, format: PixelFormat) -> Result<ID3D12Resource> {
        let heap_props = D3D12_HEAP_PROPERTIES {
            Type: D3D12_HEAP_TYPE_DEFAULT,
            CPUPageProperty: D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
            MemoryPoolPreference: D3D12_MEMORY_POOL_UNKNOWN,
            CreationNodeMask: 1,
            VisibleNodeMask: 1,
        };

        let desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Alignment: 0,
            Width: width as u64,
            Height: height,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: dxgi_format(format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
        };

        let clear_value = D3D12_CLEAR_VALUE {
            Format: dxgi_format(format),
            Anonymous: D3D12_CLEAR_VALUE_0 {
                DepthStencil: D3D12_DEPTH_STENCIL_VALUE { Depth: 1.0, Stencil: 0 },
            },
        };

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &heap_props,
                D3D12_HEAP_FLAG_NONE,
                &desc,
                D3D12_RESOURCE_STATE_DEPTH_WRITE,
                Some(&clear_value),
                &mut resource,
            )
        }
        .graphics(GraphicsErrorKind::ResourceCreation, "Failed to create depth stencil buffer")?;

        resource.ok_or_else(|| {
            graphics_error(
                GraphicsErrorKind::ResourceCreation,
                "CreateCommittedResource returned no resource",
            )
        })
    }

    fn create_depth_stencil_view(
        &self,
        resource: &ID3D12Resource,
        format: PixelFormat,
        handle: CpuDescriptorHandle,
    ) -> Result<()> {
        let desc = D3D12_DEPTH_STENCIL_VIEW_DESC {
            Format: dxgi_format(format),
            ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
            Flags: D3D12_DSV_FLAG_NONE,
            Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_DSV { MipSlice: 0 },
            },
        };
        unsafe {
            self.device.CreateDepthStencilView(
                resource,
                Some(&desc),
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr },
            );
        }
        Ok(())
    }

    fn create_swap_chain(
        &self,
        queue: &Dx12Queue,
        surface: &SurfaceHandle,
        desc: &SwapChainDescriptor,
    ) -> Result<Dx12SwapChain> {
        let hwnd = hwnd(surface)?;

        let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: desc.sample_desc.count,
                Quality: desc.sample_desc.quality,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            ..Default::default()
        };

        let fullscreen_desc = DXGI_SWAP_CHAIN_FULLSCREEN_DESC {
            RefreshRate: DXGI_RATIONAL {
                Numerator: desc.refresh_rate.numerator,
                Denominator: desc.refresh_rate.denominator,
            },
            Windowed: true.into(),
            ..Default::default()
        };

        let swap_chain: IDXGISwapChain1 = unsafe {
            self.factory.CreateSwapChainForHwnd(
                queue.raw(),
                hwnd,
                &swap_chain_desc,
                Some(&fullscreen_desc),
                None,
            )
        }
        .graphics(GraphicsErrorKind::SwapChain, "CreateSwapChainForHwnd failed")?;

        let swap_chain: IDXGISwapChain3 = swap_chain
            .cast()
            .graphics(GraphicsErrorKind::SwapChain, "Failed to cast swap chain to IDXGISwapChain3")?;

        Ok(Dx12SwapChain::new(swap_chain))
    }
}
