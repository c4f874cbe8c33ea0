//! DXGI 交换链

use windows::Win32::Graphics::Direct3D12::ID3D12Resource;
use windows::Win32::Graphics::Dxgi::*;

use super::{dxgi_format, Dx12, Dx12ResultExt};
use crate::core::error::{GraphicsErrorKind, Result};
use crate::gfx::backend::RawSwapChain;
use crate::renderer::resource::PixelFormat;

/// flip 模型交换链
pub struct Dx12SwapChain {
    swap_chain: IDXGISwapChain3,
}

impl Dx12SwapChain {
    pub(super) fn new(swap_chain: IDXGISwapChain3) -> Self {
        Self { swap_chain }
    }

    pub fn raw(&self) -> &IDXGISwapChain3 {
        &self.swap_chain
    }
}

impl RawSwapChain<Dx12> for Dx12SwapChain {
    fn current_back_buffer_index(&self) -> u32 {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() }
    }

    fn back_buffer(&self, index: u32) -> Result<ID3D12Resource> {
        unsafe { self.swap_chain.GetBuffer(index) }
            .graphics(GraphicsErrorKind::SwapChain, "IDXGISwapChain::GetBuffer failed")
    }

    fn present(&self, sync_interval: u32) -> Result<()> {
        unsafe { self.swap_chain.Present(sync_interval, DXGI_PRESENT(0)) }
            .ok()
            .graphics(GraphicsErrorKind::Presentation, "IDXGISwapChain::Present failed")
    }

    fn resize_buffers(&self, count: u32, width: u32, height: u32, format: PixelFormat) -> Result<()> {
        unsafe {
            self.swap_chain.ResizeBuffers(
                count,
                width,
                height,
                dxgi_format(format),
                DXGI_SWAP_CHAIN_FLAG(0),
            )
        }
        .graphics(GraphicsErrorKind::SwapChain, "IDXGISwapChain::ResizeBuffers failed")
    }
}
