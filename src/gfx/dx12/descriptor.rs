//! DirectX 12 描述符堆

use windows::Win32::Graphics::Direct3D12::*;

use crate::gfx::backend::RawDescriptorHeap;

/// DX12 描述符堆
///
/// 封装 ID3D12DescriptorHeap，创建时缓存 CPU 句柄基址。
pub struct Dx12DescriptorHeap {
    /// 只用于保持堆存活，视图通过 `cpu_start` 寻址
    _heap: ID3D12DescriptorHeap,
    cpu_start: usize,
}

impl Dx12DescriptorHeap {
    pub(super) fn new(heap: ID3D12DescriptorHeap) -> Self {
        let cpu_start = unsafe { heap.GetCPUDescriptorHandleForHeapStart() }.ptr;
        Self { _heap: heap, cpu_start }
    }
}

impl RawDescriptorHeap for Dx12DescriptorHeap {
    fn cpu_start(&self) -> usize {
        self.cpu_start
    }
}
