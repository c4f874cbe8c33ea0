//! Headless 图形后端
//!
//! 进程内模拟的 GPU，不需要窗口和驱动。命令队列上的工作进入一条确定性的时间线，
//! 默认提交后立即完成；延迟模式下只有 CPU 等待 fence 或显式调用 `retire` 时才推进。
//!
//! 用于测试和在没有 D3D12 的机器上做冒烟运行。除了实现 `gfx::backend` 中的 trait，
//! 还提供检查接口：已执行的命令、写入的视图、呈现次数、待完成的工作。
//!
//! 失败时返回与 D3D12/DXGI 相同的状态码，便于和真实后端的错误输出对照。

mod device;
mod gpu;
mod queue;
mod swapchain;

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::error::{DistGfxError, GraphicsError, GraphicsErrorKind};
use crate::gfx::backend::GraphicsBackend;

pub use device::{HeadlessAdapter, HeadlessDescriptorHeap, HeadlessDevice, HeadlessInstance, ViewKind, WrittenView};
pub use gpu::{Command, HeadlessGpu};
pub use queue::{HeadlessCommandAllocator, HeadlessCommandList, HeadlessFence, HeadlessQueue};
pub use swapchain::{HeadlessResource, HeadlessSwapChain, ResourceKind};

/// Headless 后端类型
pub struct Headless;

impl GraphicsBackend for Headless {
    type Instance = HeadlessInstance;
    type Adapter = HeadlessAdapter;
    type Device = HeadlessDevice;
    type Queue = HeadlessQueue;
    type Fence = HeadlessFence;
    type CommandAllocator = HeadlessCommandAllocator;
    type CommandList = HeadlessCommandList;
    type DescriptorHeap = HeadlessDescriptorHeap;
    type SwapChain = HeadlessSwapChain;
    type Resource = HeadlessResource;

    fn name() -> &'static str {
        "Headless"
    }
}

// 与 D3D12/DXGI 一致的状态码
const E_FAIL: u32 = 0x8000_4005;
const E_INVALIDARG: u32 = 0x8007_0057;
const DXGI_ERROR_INVALID_CALL: u32 = 0x887A_0001;
const DXGI_ERROR_UNSUPPORTED: u32 = 0x887A_0004;
const DXGI_ERROR_DEVICE_REMOVED: u32 = 0x887A_0005;

fn describe(code: u32) -> &'static str {
    match code {
        E_FAIL => "Unspecified error",
        E_INVALIDARG => "The parameter is incorrect.",
        DXGI_ERROR_INVALID_CALL => "The application made a call that is invalid.",
        DXGI_ERROR_UNSUPPORTED => "The requested functionality is not supported by the device or the driver.",
        DXGI_ERROR_DEVICE_REMOVED => "The GPU device instance has been suspended.",
        _ => "Unknown error",
    }
}

/// 构造带状态码的图形错误
#[track_caller]
fn native_error(kind: GraphicsErrorKind, code: u32, note: impl Into<String>) -> DistGfxError {
    GraphicsError::new(kind)
        .with_note(note)
        .with_status(code as i32, describe(code))
        .into()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 默认适配器上的测试设备
#[cfg(test)]
pub(crate) fn test_device(deferred: bool) -> crate::renderer::device::GraphicsDevice<Headless> {
    use crate::renderer::device::{DeviceOptions, GraphicsDevice};

    let mut instance = HeadlessInstance::default();
    if deferred {
        instance = instance.with_deferred_completion();
    }
    GraphicsDevice::create(&instance, &DeviceOptions::default()).expect("headless device")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_carries_status() {
        let err = native_error(GraphicsErrorKind::SwapChain, DXGI_ERROR_INVALID_CALL, "bad call");
        let DistGfxError::Graphics(graphics) = err else {
            panic!("expected graphics error");
        };
        let status = graphics.status().unwrap();
        assert_eq!(status.code as u32, DXGI_ERROR_INVALID_CALL);
        assert_eq!(status.description, "The application made a call that is invalid.");
        assert_eq!(graphics.note(), Some("bad call"));
    }
}
