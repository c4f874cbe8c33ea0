//! DXGI 工厂和适配器枚举

use tracing::{debug, warn};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

use super::device::Dx12Device;
use super::{d3d_feature_level, Dx12, Dx12ResultExt};
use crate::core::error::{graphics_error, GraphicsErrorKind, Result};
use crate::gfx::backend::RawInstance;
use crate::renderer::device::{AdapterInfo, FeatureLevel};

/// DXGI 适配器
pub type Dx12Adapter = IDXGIAdapter1;

/// DXGI 工厂
pub struct Dx12Instance {
    factory: IDXGIFactory4,
}

impl Dx12Instance {
    /// 创建 DXGI 工厂
    ///
    /// # 参数
    ///
    /// * `debug_layer` - 是否启用 D3D12 调试层；启用失败只记录警告
    pub fn new(debug_layer: bool) -> Result<Self> {
        let mut flags = DXGI_CREATE_FACTORY_FLAGS(0);

        if debug_layer {
            unsafe {
                let mut debug: Option<ID3D12Debug> = None;
                match D3D12GetDebugInterface(&mut debug) {
                    Ok(()) => {
                        if let Some(debug) = debug {
                            debug.EnableDebugLayer();
                            flags = DXGI_CREATE_FACTORY_DEBUG;
                            debug!("DX12 Debug Layer enabled");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to enable DX12 Debug Layer"),
                }
            }
        }

        let factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(flags) }
            .graphics(GraphicsErrorKind::DeviceCreation, "CreateDXGIFactory2 failed")?;

        Ok(Self { factory })
    }

    pub(super) fn factory(&self) -> &IDXGIFactory4 {
        &self.factory
    }
}

fn adapter_info(index: u32, adapter: &IDXGIAdapter1) -> Result<AdapterInfo> {
    let desc = unsafe { adapter.GetDesc1() }
        .graphics(GraphicsErrorKind::DeviceCreation, "IDXGIAdapter1::GetDesc1 failed")?;

    let len = desc.Description.iter().position(|&c| c == 0).unwrap_or(desc.Description.len());

    Ok(AdapterInfo {
        index,
        vendor_id: desc.VendorId,
        device_id: desc.DeviceId,
        description: String::from_utf16_lossy(&desc.Description[..len]),
        dedicated_video_memory: desc.DedicatedVideoMemory as u64,
        software: desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0,
    })
}

/// `EnumAdapters1` 的结果：越界（DXGI_ERROR_NOT_FOUND）返回 `None`，其他失败向上传播
fn enumerated<T>(result: windows::core::Result<T>, index: u32) -> Result<Option<T>> {
    match result {
        Ok(adapter) => Ok(Some(adapter)),
        Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => Ok(None),
        Err(e) => Err(e).graphics(
            GraphicsErrorKind::DeviceCreation,
            &format!("IDXGIFactory1::EnumAdapters1({}) failed", index),
        ),
    }
}

impl RawInstance<Dx12> for Dx12Instance {
    fn enumerate_adapters(&self) -> Result<Vec<(AdapterInfo, Dx12Adapter)>> {
        let mut adapters = Vec::new();
        loop {
            let index = adapters.len() as u32;
            let Some(adapter) = enumerated(unsafe { self.factory.EnumAdapters1(index) }, index)? else {
                break;
            };
            let info = adapter_info(index, &adapter)?;
            adapters.push((info, adapter));
        }
        Ok(adapters)
    }

    fn software_adapter(&self) -> Result<(AdapterInfo, Dx12Adapter)> {
        let adapter: IDXGIAdapter1 = unsafe { self.factory.EnumWarpAdapter() }
            .graphics(GraphicsErrorKind::DeviceCreation, "EnumWarpAdapter failed")?;

        // WARP 排在所有枚举到的适配器之后
        let index = self.enumerate_adapters()?.len() as u32;
        let mut info = adapter_info(index, &adapter)?;
        info.software = true;
        Ok((info, adapter))
    }

    fn supports_feature_level(&self, adapter: &Dx12Adapter, level: FeatureLevel) -> bool {
        unsafe {
            D3D12CreateDevice(
                adapter,
                d3d_feature_level(level),
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok()
    }

    fn create_device(&self, adapter: &Dx12Adapter, min_level: FeatureLevel) -> Result<Dx12Device> {
        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(adapter, d3d_feature_level(min_level), &mut device) }
            .graphics(GraphicsErrorKind::DeviceCreation, "D3D12CreateDevice failed")?;

        match device {
            Some(device) => Ok(Dx12Device::new(device, self.factory().clone())),
            None => Err(graphics_error(
                GraphicsErrorKind::DeviceCreation,
                "D3D12CreateDevice returned no device",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Foundation::E_FAIL;

    #[test]
    fn test_enumeration_ends_only_on_not_found() {
        assert_eq!(enumerated(Ok(7u32), 0).unwrap(), Some(7));

        let end: windows::core::Result<u32> = Err(windows::core::Error::from_hresult(DXGI_ERROR_NOT_FOUND));
        assert_eq!(enumerated(end, 2).unwrap(), None);

        let failed: windows::core::Result<u32> = Err(windows::core::Error::from_hresult(E_FAIL));
        let err = enumerated(failed, 1).unwrap_err();
        assert_eq!(err.graphics_kind(), Some(GraphicsErrorKind::DeviceCreation));
    }
}
