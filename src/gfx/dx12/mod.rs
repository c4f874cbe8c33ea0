//! DirectX 12 图形后端
//!
//! 本模块基于 windows-rs 实现 `gfx::backend` 中的 trait。每个方法对应一次
//! D3D12/DXGI 调用，状态管理都在 `renderer` 模块中完成。
//!
//! # 初始化流程
//!
//! 1. 启用调试层（可选）
//! 2. 创建 DXGI 工厂并枚举适配器
//! 3. 创建 D3D12 设备，查询最高特性级别
//! 4. 创建命令队列、fence、命令分配器和命令列表
//! 5. 创建交换链、描述符堆和渲染目标视图
//! 6. 创建深度模板缓冲

mod command;
mod descriptor;
mod device;
mod instance;
mod swapchain;

use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::core::error::{GraphicsError, GraphicsErrorKind, Result};
use crate::gfx::backend::GraphicsBackend;
use crate::renderer::descriptor::DescriptorType;
use crate::renderer::device::FeatureLevel;
use crate::renderer::resource::{PixelFormat, ResourceState};

pub use command::{Dx12CommandAllocator, Dx12CommandList, Dx12Fence, Dx12Queue};
pub use descriptor::Dx12DescriptorHeap;
pub use device::Dx12Device;
pub use instance::{Dx12Adapter, Dx12Instance};
pub use swapchain::Dx12SwapChain;

/// DirectX 12 后端类型
pub struct Dx12;

impl GraphicsBackend for Dx12 {
    type Instance = Dx12Instance;
    type Adapter = Dx12Adapter;
    type Device = Dx12Device;
    type Queue = Dx12Queue;
    type Fence = Dx12Fence;
    type CommandAllocator = Dx12CommandAllocator;
    type CommandList = Dx12CommandList;
    type DescriptorHeap = Dx12DescriptorHeap;
    type SwapChain = Dx12SwapChain;
    type Resource = ID3D12Resource;

    fn name() -> &'static str {
        "DirectX 12"
    }
}

/// 把 windows-rs 的错误转换为带状态码的 `GraphicsError`
trait Dx12ResultExt<T> {
    fn graphics(self, kind: GraphicsErrorKind, note: &str) -> Result<T>;
}

impl<T> Dx12ResultExt<T> for windows::core::Result<T> {
    #[track_caller]
    fn graphics(self, kind: GraphicsErrorKind, note: &str) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(GraphicsError::new(kind)
                .with_note(note)
                .with_status(e.code().0, e.message())
                .into()),
        }
    }
}

fn dxgi_format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        PixelFormat::Bgra8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        PixelFormat::Depth32Float => DXGI_FORMAT_D32_FLOAT,
        PixelFormat::Depth24UnormStencil8 => DXGI_FORMAT_D24_UNORM_S8_UINT,
    }
}

fn d3d_feature_level(level: FeatureLevel) -> D3D_FEATURE_LEVEL {
    match level {
        FeatureLevel::Level11_0 => D3D_FEATURE_LEVEL_11_0,
        FeatureLevel::Level11_1 => D3D_FEATURE_LEVEL_11_1,
        FeatureLevel::Level12_0 => D3D_FEATURE_LEVEL_12_0,
        FeatureLevel::Level12_1 => D3D_FEATURE_LEVEL_12_1,
        FeatureLevel::Level12_2 => D3D_FEATURE_LEVEL_12_2,
    }
}

fn from_d3d_feature_level(level: D3D_FEATURE_LEVEL) -> Option<FeatureLevel> {
    FeatureLevel::CANDIDATES
        .into_iter()
        .find(|candidate| d3d_feature_level(*candidate) == level)
}

fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
    }
}

fn heap_type(ty: DescriptorType) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match ty {
        DescriptorType::RenderTargetView => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        DescriptorType::DepthStencilView => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
        DescriptorType::CbvSrvUav => D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
        DescriptorType::Sampler => D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_level_mapping_round_trips() {
        for level in FeatureLevel::CANDIDATES {
            assert_eq!(from_d3d_feature_level(d3d_feature_level(level)), Some(level));
        }
        assert_eq!(from_d3d_feature_level(D3D_FEATURE_LEVEL_10_0), None);
    }

    #[test]
    fn test_error_carries_hresult() {
        let result: windows::core::Result<()> =
            Err(windows::core::Error::from_hresult(windows::Win32::Foundation::E_INVALIDARG));
        let err = result.graphics(GraphicsErrorKind::DeviceCreation, "CreateDevice failed").unwrap_err();
        let crate::core::error::DistGfxError::Graphics(graphics) = err else {
            panic!("expected graphics error");
        };
        assert_eq!(graphics.status().unwrap().code as u32, 0x8007_0057);
        assert_eq!(graphics.note(), Some("CreateDevice failed"));
    }
}
