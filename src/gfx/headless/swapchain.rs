//! 模拟的 GPU 资源和交换链

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{lock, native_error, Headless, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_INVALID_CALL};
use crate::core::error::{GraphicsErrorKind, Result};
use crate::gfx::backend::RawSwapChain;
use crate::renderer::resource::PixelFormat;
use crate::renderer::swapchain::SwapChainDescriptor;

/// 资源类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    BackBuffer { index: u32 },
    DepthStencil,
}

#[derive(Debug)]
struct ResourceDesc {
    id: u64,
    kind: ResourceKind,
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// 模拟 GPU 资源，克隆只增加引用计数
#[derive(Debug, Clone)]
pub struct HeadlessResource(Arc<ResourceDesc>);

impl HeadlessResource {
    pub(super) fn new(id: u64, kind: ResourceKind, width: u32, height: u32, format: PixelFormat) -> Self {
        Self(Arc::new(ResourceDesc {
            id,
            kind,
            width,
            height,
            format,
        }))
    }

    /// 资源的唯一 ID
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.0.kind
    }

    pub fn size(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.0.format
    }

    fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }
}

struct SwapState {
    buffers: Vec<HeadlessResource>,
    current: u32,
    width: u32,
    height: u32,
}

/// 模拟交换链
///
/// 每次呈现后缓冲索引加一并对缓冲数量取模；调整大小后索引回到 0。
pub struct HeadlessSwapChain {
    state: Mutex<SwapState>,
    ids: Arc<AtomicU64>,
    presents: AtomicU64,
    fail_next_present: AtomicBool,
}

impl HeadlessSwapChain {
    pub(super) fn new(desc: &SwapChainDescriptor, initial: u32, ids: Arc<AtomicU64>) -> Self {
        let buffers = Self::create_buffers(&ids, desc.buffer_count, desc.width, desc.height, desc.format);
        Self {
            state: Mutex::new(SwapState {
                buffers,
                current: initial,
                width: desc.width,
                height: desc.height,
            }),
            ids,
            presents: AtomicU64::new(0),
            fail_next_present: AtomicBool::new(false),
        }
    }

    fn create_buffers(ids: &AtomicU64, count: u32, width: u32, height: u32, format: PixelFormat) -> Vec<HeadlessResource> {
        (0..count)
            .map(|index| {
                HeadlessResource::new(
                    ids.fetch_add(1, Ordering::Relaxed),
                    ResourceKind::BackBuffer { index },
                    width,
                    height,
                    format,
                )
            })
            .collect()
    }

    /// 已呈现的次数
    pub fn present_count(&self) -> u64 {
        self.presents.load(Ordering::SeqCst)
    }

    /// 下一次呈现返回设备移除错误
    pub fn fail_next_present(&self) {
        self.fail_next_present.store(true, Ordering::SeqCst);
    }

    pub fn size(&self) -> (u32, u32) {
        let state = lock(&self.state);
        (state.width, state.height)
    }
}

impl RawSwapChain<Headless> for HeadlessSwapChain {
    fn current_back_buffer_index(&self) -> u32 {
        lock(&self.state).current
    }

    fn back_buffer(&self, index: u32) -> Result<HeadlessResource> {
        lock(&self.state)
            .buffers
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                native_error(
                    GraphicsErrorKind::SwapChain,
                    DXGI_ERROR_INVALID_CALL,
                    format!("GetBuffer({}) out of range", index),
                )
            })
    }

    fn present(&self, sync_interval: u32) -> Result<()> {
        if self.fail_next_present.swap(false, Ordering::SeqCst) {
            return Err(native_error(
                GraphicsErrorKind::Presentation,
                DXGI_ERROR_DEVICE_REMOVED,
                "Present failed",
            ));
        }

        if sync_interval > 4 {
            return Err(native_error(
                GraphicsErrorKind::Presentation,
                DXGI_ERROR_INVALID_CALL,
                format!("Invalid sync interval {}", sync_interval),
            ));
        }

        let mut state = lock(&self.state);
        let count = state.buffers.len() as u32;
        state.current = (state.current + 1) % count;
        self.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resize_buffers(&self, count: u32, width: u32, height: u32, format: PixelFormat) -> Result<()> {
        let mut state = lock(&self.state);

        if state.buffers.iter().any(HeadlessResource::is_shared) {
            return Err(native_error(
                GraphicsErrorKind::SwapChain,
                DXGI_ERROR_INVALID_CALL,
                "ResizeBuffers called with outstanding back buffer references",
            ));
        }

        if !(2..=16).contains(&count) || width == 0 || height == 0 {
            return Err(native_error(
                GraphicsErrorKind::SwapChain,
                DXGI_ERROR_INVALID_CALL,
                format!("Invalid resize {}x{} with {} buffers", width, height, count),
            ));
        }

        state.buffers = Self::create_buffers(&self.ids, count, width, height, format);
        state.current = 0;
        state.width = width;
        state.height = height;
        Ok(())
    }
}
