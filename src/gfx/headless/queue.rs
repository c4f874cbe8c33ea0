//! 模拟的命令队列、fence、命令分配器和命令列表

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::gpu::{Command, GpuOp, HeadlessGpu};
use super::swapchain::HeadlessResource;
use super::{lock, native_error, Headless, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_INVALID_CALL, E_FAIL};
use crate::core::error::{GraphicsErrorKind, Result};
use crate::gfx::backend::{RawCommandAllocator, RawCommandList, RawFence, RawQueue};
use crate::renderer::descriptor::CpuDescriptorHandle;
use crate::renderer::resource::{ResourceState, ScissorRect, Viewport};

/// 模拟命令队列
pub struct HeadlessQueue {
    gpu: HeadlessGpu,
}

impl HeadlessQueue {
    pub(super) fn new(gpu: HeadlessGpu) -> Self {
        Self { gpu }
    }
}

impl RawQueue<Headless> for HeadlessQueue {
    fn execute_command_lists(&self, lists: &[&HeadlessCommandList]) -> Result<()> {
        // 整批校验后再提交，任何一个列表仍打开时什么都不提交
        let mut ops = Vec::with_capacity(lists.len());
        for list in lists {
            let state = lock(&list.state);
            if state.open {
                return Err(native_error(
                    GraphicsErrorKind::CommandExecution,
                    DXGI_ERROR_INVALID_CALL,
                    "ExecuteCommandLists called with an open command list",
                ));
            }
            ops.push(GpuOp::Execute {
                allocator: state.allocator,
                commands: state.commands.clone(),
            });
        }

        for op in ops {
            self.gpu.submit(op);
        }
        Ok(())
    }

    fn signal(&self, fence: &HeadlessFence, value: u64) -> Result<()> {
        self.gpu.submit(GpuOp::Signal {
            fence: Arc::clone(&fence.value),
            value,
        });
        Ok(())
    }
}

/// 模拟 fence
pub struct HeadlessFence {
    value: Arc<AtomicU64>,
    gpu: HeadlessGpu,
}

impl HeadlessFence {
    pub(super) fn new(initial_value: u64, gpu: HeadlessGpu) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(initial_value)),
            gpu,
        }
    }
}

impl RawFence for HeadlessFence {
    fn completed_value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// 推进时间线直到写入目标值；队列里没有能写入它的工作时视为设备丢失
    fn wait_for_completion(&self, value: u64) -> Result<()> {
        if self.gpu.run_until(&self.value, value) {
            Ok(())
        } else {
            Err(native_error(
                GraphicsErrorKind::DeviceLost,
                DXGI_ERROR_DEVICE_REMOVED,
                format!(
                    "Fence value {} can never be reached (completed {})",
                    value,
                    self.completed_value()
                ),
            ))
        }
    }
}

/// 模拟命令分配器
pub struct HeadlessCommandAllocator {
    id: u64,
    gpu: HeadlessGpu,
}

impl HeadlessCommandAllocator {
    pub(super) fn new(id: u64, gpu: HeadlessGpu) -> Self {
        Self { id, gpu }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl RawCommandAllocator for HeadlessCommandAllocator {
    fn reset(&self) -> Result<()> {
        if self.gpu.has_pending_execution(self.id) {
            return Err(native_error(
                GraphicsErrorKind::CommandExecution,
                E_FAIL,
                "Command allocator reset while the GPU is still executing its commands",
            ));
        }
        Ok(())
    }
}

struct ListState {
    open: bool,
    allocator: u64,
    commands: Vec<Command>,
}

/// 模拟命令列表
pub struct HeadlessCommandList {
    state: Mutex<ListState>,
}

impl HeadlessCommandList {
    /// 新建的列表处于录制状态
    pub(super) fn new(allocator: u64) -> Self {
        Self {
            state: Mutex::new(ListState {
                open: true,
                allocator,
                commands: Vec::new(),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// 当前录制的命令
    pub fn commands(&self) -> Vec<Command> {
        lock(&self.state).commands.clone()
    }

    fn push(&self, command: Command) {
        lock(&self.state).commands.push(command);
    }
}

impl RawCommandList<Headless> for HeadlessCommandList {
    fn reset(&self, allocator: &HeadlessCommandAllocator) -> Result<()> {
        let mut state = lock(&self.state);
        if state.open {
            return Err(native_error(
                GraphicsErrorKind::CommandExecution,
                E_FAIL,
                "Command list reset while open",
            ));
        }
        state.open = true;
        state.allocator = allocator.id();
        state.commands.clear();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(native_error(
                GraphicsErrorKind::CommandExecution,
                E_FAIL,
                "Command list closed twice",
            ));
        }
        state.open = false;
        Ok(())
    }

    fn resource_barrier(&self, resource: &HeadlessResource, before: ResourceState, after: ResourceState) {
        self.push(Command::Barrier {
            resource: resource.id(),
            before,
            after,
        });
    }

    fn set_viewport_and_scissor(&self, viewport: &Viewport, scissor: &ScissorRect) {
        self.push(Command::SetViewportAndScissor {
            viewport: *viewport,
            scissor: *scissor,
        });
    }

    fn set_render_target(&self, rtv: CpuDescriptorHandle, dsv: Option<CpuDescriptorHandle>) {
        self.push(Command::SetRenderTarget {
            rtv: rtv.ptr,
            dsv: dsv.map(|handle| handle.ptr),
        });
    }

    fn clear_render_target(&self, rtv: CpuDescriptorHandle, color: [f32; 4]) {
        self.push(Command::ClearRenderTarget { rtv: rtv.ptr, color });
    }

    fn clear_depth_stencil(&self, dsv: CpuDescriptorHandle, depth: f32, stencil: u8) {
        self.push(Command::ClearDepthStencil {
            dsv: dsv.ptr,
            depth,
            stencil,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_open_close_rules() {
        let gpu = HeadlessGpu::new(false);
        let allocator = HeadlessCommandAllocator::new(1, gpu.clone());
        let list = HeadlessCommandList::new(allocator.id());
        assert!(list.is_open());

        // 打开的列表不能 reset，也不能执行
        assert!(list.reset(&allocator).is_err());
        let queue = HeadlessQueue::new(gpu.clone());
        assert!(queue.execute_command_lists(&[&list]).is_err());

        list.close().unwrap();
        assert!(list.close().is_err());
        list.reset(&allocator).unwrap();
        assert!(list.commands().is_empty());
    }

    #[test]
    fn test_allocator_reset_blocked_by_pending_work() {
        let gpu = HeadlessGpu::new(true);
        let queue = HeadlessQueue::new(gpu.clone());
        let allocator = HeadlessCommandAllocator::new(3, gpu.clone());
        let list = HeadlessCommandList::new(allocator.id());
        list.close().unwrap();

        queue.execute_command_lists(&[&list]).unwrap();
        assert!(allocator.reset().is_err());

        gpu.retire_all();
        assert!(allocator.reset().is_ok());
    }

    #[test]
    fn test_lists_execute_in_submission_order() {
        let gpu = HeadlessGpu::new(false);
        let queue = HeadlessQueue::new(gpu.clone());
        let first_allocator = HeadlessCommandAllocator::new(1, gpu.clone());
        let second_allocator = HeadlessCommandAllocator::new(2, gpu.clone());

        let first = HeadlessCommandList::new(first_allocator.id());
        first.clear_render_target(CpuDescriptorHandle::new(0, 0), [0.0, 0.0, 0.0, 1.0]);
        first.close().unwrap();

        let second = HeadlessCommandList::new(second_allocator.id());
        second.clear_depth_stencil(CpuDescriptorHandle::new(32, 0), 1.0, 0);
        second.close().unwrap();

        queue.execute_command_lists(&[&second, &first]).unwrap();

        let executed = gpu.executed_lists();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0], second.commands());
        assert_eq!(executed[1], first.commands());
    }

    #[test]
    fn test_batch_with_open_list_submits_nothing() {
        let gpu = HeadlessGpu::new(true);
        let queue = HeadlessQueue::new(gpu.clone());
        let allocator = HeadlessCommandAllocator::new(1, gpu.clone());

        let closed = HeadlessCommandList::new(allocator.id());
        closed.close().unwrap();
        let open = HeadlessCommandList::new(allocator.id());

        let err = queue.execute_command_lists(&[&closed, &open]).unwrap_err();
        assert_eq!(err.graphics_kind(), Some(GraphicsErrorKind::CommandExecution));
        assert_eq!(gpu.pending_ops(), 0);
        assert!(gpu.executed_lists().is_empty());
        assert!(allocator.reset().is_ok());
    }

    #[test]
    fn test_fence_wait_drives_timeline() {
        let gpu = HeadlessGpu::new(true);
        let queue = HeadlessQueue::new(gpu.clone());
        let fence = HeadlessFence::new(0, gpu.clone());

        queue.signal(&fence, 1).unwrap();
        queue.signal(&fence, 2).unwrap();
        assert_eq!(fence.completed_value(), 0);

        fence.wait_for_completion(1).unwrap();
        assert_eq!(fence.completed_value(), 1);
        assert_eq!(gpu.pending_ops(), 1);

        let err = fence.wait_for_completion(3).unwrap_err();
        assert_eq!(err.graphics_kind(), Some(GraphicsErrorKind::DeviceLost));
        assert_eq!(fence.completed_value(), 2);
    }
}
