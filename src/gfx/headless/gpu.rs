//! 模拟 GPU 的工作时间线

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::lock;
use crate::renderer::resource::{ResourceState, ScissorRect, Viewport};

/// 命令列表中录制的一条命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetViewportAndScissor { viewport: Viewport, scissor: ScissorRect },
    Barrier { resource: u64, before: ResourceState, after: ResourceState },
    SetRenderTarget { rtv: usize, dsv: Option<usize> },
    ClearRenderTarget { rtv: usize, color: [f32; 4] },
    ClearDepthStencil { dsv: usize, depth: f32, stencil: u8 },
}

pub(super) enum GpuOp {
    Execute { allocator: u64, commands: Vec<Command> },
    Signal { fence: Arc<AtomicU64>, value: u64 },
}

struct Timeline {
    pending: VecDeque<GpuOp>,
    executed: Vec<Vec<Command>>,
    deferred: bool,
}

impl Timeline {
    fn retire_front(&mut self) -> bool {
        match self.pending.pop_front() {
            Some(GpuOp::Execute { commands, .. }) => {
                self.executed.push(commands);
                true
            }
            Some(GpuOp::Signal { fence, value }) => {
                fence.fetch_max(value, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

/// 模拟 GPU
///
/// 克隆得到的句柄共享同一条时间线。
#[derive(Clone)]
pub struct HeadlessGpu {
    timeline: Arc<Mutex<Timeline>>,
}

impl HeadlessGpu {
    pub(super) fn new(deferred: bool) -> Self {
        Self {
            timeline: Arc::new(Mutex::new(Timeline {
                pending: VecDeque::new(),
                executed: Vec::new(),
                deferred,
            })),
        }
    }

    pub(super) fn submit(&self, op: GpuOp) {
        let mut timeline = lock(&self.timeline);
        timeline.pending.push_back(op);
        if !timeline.deferred {
            while timeline.retire_front() {}
        }
    }

    /// 按提交顺序完成至多 `count` 个操作，返回实际完成的数量
    pub fn retire(&self, count: usize) -> usize {
        let mut timeline = lock(&self.timeline);
        (0..count).take_while(|_| timeline.retire_front()).count()
    }

    /// 完成所有待处理的操作
    pub fn retire_all(&self) {
        let mut timeline = lock(&self.timeline);
        while timeline.retire_front() {}
    }

    /// 尚未完成的操作数量
    pub fn pending_ops(&self) -> usize {
        lock(&self.timeline).pending.len()
    }

    /// 已执行的命令列表，按执行顺序
    pub fn executed_lists(&self) -> Vec<Vec<Command>> {
        lock(&self.timeline).executed.clone()
    }

    pub(super) fn has_pending_execution(&self, allocator: u64) -> bool {
        lock(&self.timeline).pending.iter().any(|op| {
            matches!(op, GpuOp::Execute { allocator: id, .. } if *id == allocator)
        })
    }

    /// 推进时间线直到 fence 达到 `value`；队列耗尽仍未达到时返回 false
    pub(super) fn run_until(&self, fence: &AtomicU64, value: u64) -> bool {
        let mut timeline = lock(&self.timeline);
        while fence.load(Ordering::SeqCst) < value {
            if !timeline.retire_front() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(fence: &Arc<AtomicU64>, value: u64) -> GpuOp {
        GpuOp::Signal { fence: Arc::clone(fence), value }
    }

    #[test]
    fn test_immediate_mode_completes_on_submit() {
        let gpu = HeadlessGpu::new(false);
        let fence = Arc::new(AtomicU64::new(0));

        gpu.submit(GpuOp::Execute { allocator: 1, commands: Vec::new() });
        gpu.submit(signal(&fence, 1));

        assert_eq!(gpu.pending_ops(), 0);
        assert_eq!(fence.load(Ordering::SeqCst), 1);
        assert_eq!(gpu.executed_lists().len(), 1);
    }

    #[test]
    fn test_deferred_mode_retires_in_order() {
        let gpu = HeadlessGpu::new(true);
        let fence = Arc::new(AtomicU64::new(0));

        gpu.submit(GpuOp::Execute { allocator: 7, commands: Vec::new() });
        gpu.submit(signal(&fence, 1));
        gpu.submit(signal(&fence, 2));
        assert!(gpu.has_pending_execution(7));
        assert!(!gpu.has_pending_execution(8));

        assert_eq!(gpu.retire(2), 2);
        assert_eq!(fence.load(Ordering::SeqCst), 1);
        assert!(!gpu.has_pending_execution(7));

        assert!(gpu.run_until(&fence, 2));
        assert!(!gpu.run_until(&fence, 3));
        assert_eq!(gpu.retire(5), 0);
    }
}
