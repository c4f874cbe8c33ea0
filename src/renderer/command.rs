//! 命令提交模块
//!
//! 持有命令队列、每个后缓冲一个的命令分配器，以及唯一的图形命令列表。
//!
//! # 状态机
//!
//! ```text
//! Closed --reset--> Recording --close--> Closed --execute--> Closed
//! ```
//!
//! - 构造完成后命令列表处于 `Closed` 状态
//! - 对 `Closed` 列表调用 `record`/`close`、对 `Recording` 列表调用 `reset`、
//!   执行仍在录制的列表，都会返回 `InvalidState` 错误
//! - 录制回调失败时关闭列表并向上传播错误，不会提交部分命令
//! - 分配器只能在 GPU 完成其最后一次提交后重置

use tracing::{debug, trace, warn};

use crate::core::error::{graphics_error, GraphicsErrorKind, Result};
use crate::gfx::backend::{GraphicsBackend, RawCommandAllocator, RawCommandList, RawDevice, RawQueue};
use crate::renderer::device::GraphicsDevice;
use crate::renderer::sync::{FenceManager, FenceValue};

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// 已关闭，可以执行或重置
    Closed,
    /// 正在录制
    Recording,
}

struct AllocatorSlot<B: GraphicsBackend> {
    raw: B::CommandAllocator,
    /// 最后一次提交对应的 fence 值
    last_submission: FenceValue,
}

/// 命令提交单元
pub struct CommandContext<B: GraphicsBackend> {
    queue: B::Queue,
    allocators: Vec<AllocatorSlot<B>>,
    list: B::CommandList,
    state: CommandListState,
    /// 当前录制使用的分配器
    recording: Option<usize>,
    /// 已关闭、等待执行的录制
    ready: Option<usize>,
    /// 已执行、尚未 signal 的分配器
    unsignaled: Vec<usize>,
}

impl<B: GraphicsBackend> CommandContext<B> {
    /// 创建命令队列、`allocator_count` 个分配器和一个命令列表
    ///
    /// # 参数
    ///
    /// * `device` - 图形设备
    /// * `allocator_count` - 分配器数量，通常等于后缓冲数量
    pub fn new(device: &GraphicsDevice<B>, allocator_count: usize) -> Result<Self> {
        if allocator_count == 0 {
            return Err(graphics_error(
                GraphicsErrorKind::CommandExecution,
                "At least one command allocator is required",
            ));
        }

        let raw = device.raw();
        let queue = raw.create_command_queue()?;

        let allocators = (0..allocator_count)
            .map(|_| {
                Ok(AllocatorSlot {
                    raw: raw.create_command_allocator()?,
                    last_submission: FenceValue::default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // 命令列表创建后处于录制状态，先关闭
        let list = raw.create_command_list(&allocators[0].raw)?;
        list.close()?;

        #[cfg(debug_assertions)]
        debug!(allocators = allocator_count, "Command queue, allocators and list created");

        Ok(Self {
            queue,
            allocators,
            list,
            state: CommandListState::Closed,
            recording: None,
            ready: None,
            unsignaled: Vec::new(),
        })
    }

    /// 命令队列
    pub fn queue(&self) -> &B::Queue {
        &self.queue
    }

    /// 命令列表当前状态
    pub fn state(&self) -> CommandListState {
        self.state
    }

    pub fn allocator_count(&self) -> usize {
        self.allocators.len()
    }

    /// 分配器最后一次提交对应的 fence 值
    pub fn last_submission(&self, allocator_index: usize) -> Option<FenceValue> {
        self.allocators.get(allocator_index).map(|slot| slot.last_submission)
    }

    /// 重置分配器和命令列表，开始录制
    ///
    /// GPU 尚未完成该分配器的最后一次提交时返回 `InvalidState`，
    /// 调用方应先等待对应的 fence 值。
    pub fn reset(&mut self, allocator_index: usize, fence: &mut FenceManager<B>) -> Result<()> {
        if self.state == CommandListState::Recording {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                "Command list reset while still recording",
            ));
        }

        let Some(slot) = self.allocators.get(allocator_index) else {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                format!(
                    "Command allocator index {} out of range (count {})",
                    allocator_index,
                    self.allocators.len()
                ),
            ));
        };

        if self.unsignaled.contains(&allocator_index) {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                format!("Command allocator {} was submitted but never signaled", allocator_index),
            ));
        }

        if !fence.is_completed(slot.last_submission) {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                format!(
                    "Command allocator {} is still in use by the GPU (fence value {})",
                    allocator_index,
                    slot.last_submission.value()
                ),
            ));
        }

        slot.raw.reset()?;
        self.list.reset(&slot.raw)?;

        self.state = CommandListState::Recording;
        self.recording = Some(allocator_index);
        self.ready = None;

        trace!(allocator = allocator_index, "Command list reset");
        Ok(())
    }

    /// 向打开的命令列表录制命令
    ///
    /// 回调失败时关闭列表，丢弃本次录制并返回回调的错误。
    pub fn record<R>(&mut self, body: impl FnOnce(&B::CommandList) -> Result<R>) -> Result<R> {
        if self.state != CommandListState::Recording {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                "Cannot record into a closed command list",
            ));
        }

        match body(&self.list) {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Err(close_err) = self.list.close() {
                    warn!(error = %close_err, "Failed to close command list after recording error");
                }
                self.state = CommandListState::Closed;
                self.recording = None;
                Err(err)
            }
        }
    }

    /// 结束录制
    pub fn close(&mut self) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                "Command list is already closed",
            ));
        }

        self.list.close()?;
        self.state = CommandListState::Closed;
        self.ready = self.recording.take();
        Ok(())
    }

    /// 把已关闭的命令列表提交到队列
    pub fn execute(&mut self, fence: &mut FenceManager<B>) -> Result<()> {
        if self.state == CommandListState::Recording {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                "Cannot execute a command list that is still recording",
            ));
        }

        let Some(allocator_index) = self.ready.take() else {
            return Err(graphics_error(
                GraphicsErrorKind::InvalidState,
                "No closed recording to execute",
            ));
        };

        self.queue.execute_command_lists(&[&self.list])?;
        fence.mark_submitted();
        self.unsignaled.push(allocator_index);

        trace!(allocator = allocator_index, "Command list executed");
        Ok(())
    }

    /// 用刚 signal 的 fence 值标记之前执行过的分配器
    pub fn on_signal(&mut self, value: FenceValue) {
        for index in self.unsignaled.drain(..) {
            self.allocators[index].last_submission = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DistGfxError;
    use crate::gfx::headless::{test_device, Command, Headless};
    use crate::renderer::descriptor::CpuDescriptorHandle;

    fn setup(deferred: bool) -> (GraphicsDevice<Headless>, FenceManager<Headless>, CommandContext<Headless>) {
        let device = test_device(deferred);
        let fence = FenceManager::new(&device).unwrap();
        let commands = CommandContext::new(&device, 2).unwrap();
        (device, fence, commands)
    }

    fn kind(result: Result<()>) -> Option<GraphicsErrorKind> {
        result.err().and_then(|e| e.graphics_kind())
    }

    #[test]
    fn test_initial_state_is_closed() {
        let (_device, _fence, commands) = setup(false);
        assert_eq!(commands.state(), CommandListState::Closed);
        assert_eq!(commands.allocator_count(), 2);
        assert_eq!(commands.last_submission(0), Some(FenceValue::new(0)));
        assert_eq!(commands.last_submission(2), None);
    }

    #[test]
    fn test_state_machine_rejects_invalid_transitions() {
        let (_device, mut fence, mut commands) = setup(false);

        // 未 reset 不能录制或关闭
        assert_eq!(kind(commands.record(|_| Ok(()))), Some(GraphicsErrorKind::InvalidState));
        assert_eq!(kind(commands.close()), Some(GraphicsErrorKind::InvalidState));

        commands.reset(0, &mut fence).unwrap();
        assert_eq!(commands.state(), CommandListState::Recording);

        // 录制中不能再次 reset，也不能执行
        assert_eq!(kind(commands.reset(1, &mut fence)), Some(GraphicsErrorKind::InvalidState));
        assert_eq!(kind(commands.execute(&mut fence)), Some(GraphicsErrorKind::InvalidState));

        commands.close().unwrap();
        commands.execute(&mut fence).unwrap();

        // 同一次录制不能执行两次
        assert_eq!(kind(commands.execute(&mut fence)), Some(GraphicsErrorKind::InvalidState));
    }

    #[test]
    fn test_reset_out_of_range() {
        let (_device, mut fence, mut commands) = setup(false);
        assert_eq!(kind(commands.reset(5, &mut fence)), Some(GraphicsErrorKind::InvalidState));
    }

    #[test]
    fn test_allocator_in_flight_cannot_be_reset() {
        let (device, mut fence, mut commands) = setup(true);

        commands.reset(0, &mut fence).unwrap();
        commands.close().unwrap();
        commands.execute(&mut fence).unwrap();

        // 提交后尚未 signal
        assert_eq!(kind(commands.reset(0, &mut fence)), Some(GraphicsErrorKind::InvalidState));

        let value = fence.signal(commands.queue()).unwrap();
        commands.on_signal(value);
        assert_eq!(commands.last_submission(0), Some(value));

        // GPU 尚未完成
        assert_eq!(kind(commands.reset(0, &mut fence)), Some(GraphicsErrorKind::InvalidState));

        // 其他分配器不受影响
        commands.reset(1, &mut fence).unwrap();
        commands.close().unwrap();

        fence.wait_for_value(value).unwrap();
        commands.reset(0, &mut fence).unwrap();
        assert_eq!(device.raw().gpu().pending_ops(), 0);
    }

    #[test]
    fn test_failing_body_closes_list() {
        let (device, mut fence, mut commands) = setup(false);

        commands.reset(0, &mut fence).unwrap();
        let result: Result<()> = commands.record(|list| {
            list.clear_depth_stencil(CpuDescriptorHandle::new(0, 0), 1.0, 0);
            Err(DistGfxError::Initialization("draw failed".to_string()))
        });

        assert!(matches!(result, Err(DistGfxError::Initialization(_))));
        assert_eq!(commands.state(), CommandListState::Closed);

        // 本次录制被丢弃，没有提交任何命令
        assert_eq!(kind(commands.execute(&mut fence)), Some(GraphicsErrorKind::InvalidState));
        assert!(device.raw().gpu().executed_lists().is_empty());

        // 可以重新开始
        commands.reset(0, &mut fence).unwrap();
        commands.close().unwrap();
    }

    #[test]
    fn test_recorded_commands_reach_the_queue() {
        let (device, mut fence, mut commands) = setup(false);

        commands.reset(1, &mut fence).unwrap();
        commands
            .record(|list| {
                list.clear_render_target(CpuDescriptorHandle::new(64, 2), [1.0, 0.0, 0.0, 1.0]);
                Ok(())
            })
            .unwrap();
        commands.close().unwrap();
        commands.execute(&mut fence).unwrap();

        let executed = device.raw().gpu().executed_lists();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0],
            vec![Command::ClearRenderTarget { rtv: 64, color: [1.0, 0.0, 0.0, 1.0] }]
        );
    }
}
