//! 命令队列、fence、命令分配器和图形命令列表

use std::mem::ManuallyDrop;

use tracing::warn;
use windows::core::{Interface, PCSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE, RECT, WAIT_OBJECT_0};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use super::{resource_state, Dx12, Dx12ResultExt};
use crate::core::error::{graphics_error, GraphicsErrorKind, Result};
use crate::gfx::backend::{RawCommandAllocator, RawCommandList, RawFence, RawQueue};
use crate::renderer::descriptor::CpuDescriptorHandle;
use crate::renderer::resource::{ResourceState, ScissorRect, Viewport};

/// Direct 命令队列
pub struct Dx12Queue {
    queue: ID3D12CommandQueue,
}

impl Dx12Queue {
    pub(super) fn new(queue: ID3D12CommandQueue) -> Self {
        Self { queue }
    }

    pub fn raw(&self) -> &ID3D12CommandQueue {
        &self.queue
    }
}

impl RawQueue<Dx12> for Dx12Queue {
    fn execute_command_lists(&self, lists: &[&Dx12CommandList]) -> Result<()> {
        let lists = lists
            .iter()
            .map(|list| list.raw().cast::<ID3D12CommandList>().map(Some))
            .collect::<windows::core::Result<Vec<_>>>()
            .graphics(GraphicsErrorKind::CommandExecution, "Failed to cast command list")?;

        unsafe { self.queue.ExecuteCommandLists(&lists) };
        Ok(())
    }

    fn signal(&self, fence: &Dx12Fence, value: u64) -> Result<()> {
        unsafe { self.queue.Signal(&fence.fence, value) }
            .graphics(GraphicsErrorKind::Synchronization, "ID3D12CommandQueue::Signal failed")
    }
}

/// 等待期间持有的事件句柄，离开作用域时关闭
struct EventHandle(HANDLE);

impl Drop for EventHandle {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.0) } {
            warn!(error = %e, "Failed to close fence event");
        }
    }
}

/// D3D12 fence
pub struct Dx12Fence {
    fence: ID3D12Fence,
}

impl Dx12Fence {
    pub(super) fn new(fence: ID3D12Fence) -> Self {
        Self { fence }
    }
}

impl RawFence for Dx12Fence {
    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn wait_for_completion(&self, value: u64) -> Result<()> {
        let event = unsafe { CreateEventA(None, false, false, PCSTR::null()) }
            .map(EventHandle)
            .graphics(GraphicsErrorKind::Synchronization, "Failed to create fence event")?;

        unsafe { self.fence.SetEventOnCompletion(value, event.0) }
            .graphics(GraphicsErrorKind::Synchronization, "SetEventOnCompletion failed")?;

        let status = unsafe { WaitForSingleObject(event.0, INFINITE) };
        if status != WAIT_OBJECT_0 {
            return Err(graphics_error(
                GraphicsErrorKind::Synchronization,
                format!("WaitForSingleObject returned {:#X} while waiting for fence {}", status.0, value),
            ));
        }

        // 设备移除时 fence 读出 UINT64_MAX
        if self.completed_value() == u64::MAX {
            return Err(graphics_error(GraphicsErrorKind::DeviceLost, "Device removed during fence wait"));
        }
        Ok(())
    }
}

/// 命令分配器
pub struct Dx12CommandAllocator {
    allocator: ID3D12CommandAllocator,
}

impl Dx12CommandAllocator {
    pub(super) fn new(allocator: ID3D12CommandAllocator) -> Self {
        Self { allocator }
    }

    pub fn raw(&self) -> &ID3D12CommandAllocator {
        &self.allocator
    }
}

impl RawCommandAllocator for Dx12CommandAllocator {
    fn reset(&self) -> Result<()> {
        unsafe { self.allocator.Reset() }
            .graphics(GraphicsErrorKind::CommandExecution, "ID3D12CommandAllocator::Reset failed")
    }
}

/// 图形命令列表
pub struct Dx12CommandList {
    list: ID3D12GraphicsCommandList,
}

impl Dx12CommandList {
    pub(super) fn new(list: ID3D12GraphicsCommandList) -> Self {
        Self { list }
    }

    pub fn raw(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }
}

fn cpu_handle(handle: CpuDescriptorHandle) -> D3D12_CPU_DESCRIPTOR_HANDLE {
    D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr }
}

impl RawCommandList<Dx12> for Dx12CommandList {
    fn reset(&self, allocator: &Dx12CommandAllocator) -> Result<()> {
        unsafe { self.list.Reset(allocator.raw(), None::<&ID3D12PipelineState>) }
            .graphics(GraphicsErrorKind::CommandExecution, "ID3D12GraphicsCommandList::Reset failed")
    }

    fn close(&self) -> Result<()> {
        unsafe { self.list.Close() }
            .graphics(GraphicsErrorKind::CommandExecution, "ID3D12GraphicsCommandList::Close failed")
    }

    fn resource_barrier(&self, resource: &ID3D12Resource, before: ResourceState, after: ResourceState) {
        let barrier = D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                    pResource: ManuallyDrop::new(Some(resource.clone())),
                    Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                    StateBefore: resource_state(before),
                    StateAfter: resource_state(after),
                }),
            },
        };

        let barriers = [barrier];
        unsafe {
            self.list.ResourceBarrier(&barriers);
            // 释放屏障中持有的资源引用
            let [barrier] = barriers;
            let transition = ManuallyDrop::into_inner(barrier.Anonymous.Transition);
            drop(ManuallyDrop::into_inner(transition.pResource));
        }
    }

    fn set_viewport_and_scissor(&self, viewport: &Viewport, scissor: &ScissorRect) {
        let viewport = D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        let rect = RECT {
            left: scissor.left,
            top: scissor.top,
            right: scissor.right,
            bottom: scissor.bottom,
        };

        unsafe {
            self.list.RSSetViewports(&[viewport]);
            self.list.RSSetScissorRects(&[rect]);
        }
    }

    fn set_render_target(&self, rtv: CpuDescriptorHandle, dsv: Option<CpuDescriptorHandle>) {
        let rtv = cpu_handle(rtv);
        let dsv = dsv.map(cpu_handle);
        unsafe {
            self.list.OMSetRenderTargets(
                1,
                Some(&rtv),
                false,
                dsv.as_ref().map(|handle| handle as *const _),
            );
        }
    }

    fn clear_render_target(&self, rtv: CpuDescriptorHandle, color: [f32; 4]) {
        unsafe { self.list.ClearRenderTargetView(cpu_handle(rtv), &color, None) };
    }

    fn clear_depth_stencil(&self, dsv: CpuDescriptorHandle, depth: f32, stencil: u8) {
        unsafe {
            self.list.ClearDepthStencilView(
                cpu_handle(dsv),
                D3D12_CLEAR_FLAG_DEPTH | D3D12_CLEAR_FLAG_STENCIL,
                depth,
                stencil,
                None,
            );
        }
    }
}
