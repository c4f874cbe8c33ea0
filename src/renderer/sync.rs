//! GPU 同步机制模块
//!
//! 基于 fence 的 CPU-GPU 同步，防止 CPU 跑到 GPU 前面太远。
//!
//! # 设计原则
//!
//! - **单调递增**：`current_value` 和观测到的完成值都只会增加
//! - **按需等待**：只有观测到的完成值低于目标值时才阻塞 CPU
//! - **幂等刷新**：没有新提交且上次 signal 已完成时，`flush` 不 signal 也不等待
//!
//! # 使用场景
//!
//! 1. **帧同步**：复用某帧的命令分配器前等待该帧的 fence 值
//! 2. **调整大小**：释放交换链缓冲前刷新命令队列
//! 3. **销毁**：释放 GPU 对象前刷新命令队列

use tracing::{debug, trace};

use crate::core::error::Result;
use crate::gfx::backend::{GraphicsBackend, RawDevice, RawFence, RawQueue};
use crate::renderer::device::GraphicsDevice;

/// Fence 值
///
/// 用于CPU-GPU同步的单调递增值。
/// CPU可以等待GPU完成特定Fence值对应的工作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 创建新的Fence值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Fence 管理器
///
/// 持有一个原生 fence，跟踪 CPU 侧最后 signal 的值和 GPU 侧最后观测到的完成值。
///
/// # 示例
///
/// ```ignore
/// let mut fence = FenceManager::new(&device)?;
///
/// // 提交工作并 signal
/// commands.execute(&mut fence)?;
/// let value = fence.signal(commands.queue())?;
///
/// // 等待完成
/// fence.wait_for_value(value)?;
/// ```
pub struct FenceManager<B: GraphicsBackend> {
    fence: B::Fence,
    /// 最后 signal 的值（CPU 侧）
    current_value: FenceValue,
    /// 最后观测到的完成值（GPU 侧）
    completed_value: FenceValue,
    /// 上次 signal 之后是否有新的提交
    unsignaled_work: bool,
    /// 实际阻塞等待的次数
    blocking_waits: u64,
}

impl<B: GraphicsBackend> FenceManager<B> {
    /// 创建初始值为 0 的 fence
    pub fn new(device: &GraphicsDevice<B>) -> Result<Self> {
        let fence = device.raw().create_fence(0)?;

        #[cfg(debug_assertions)]
        debug!("Fence created");

        Ok(Self {
            fence,
            current_value: FenceValue::new(0),
            completed_value: FenceValue::new(0),
            unsignaled_work: false,
            blocking_waits: 0,
        })
    }

    /// 底层 fence
    pub fn raw(&self) -> &B::Fence {
        &self.fence
    }

    /// 最后 signal 的值
    pub fn current_value(&self) -> FenceValue {
        self.current_value
    }

    /// 读取 GPU 完成值并更新缓存
    pub fn completed_value(&mut self) -> FenceValue {
        let observed = FenceValue::new(self.fence.completed_value());
        if observed > self.completed_value {
            self.completed_value = observed;
        }
        self.completed_value
    }

    /// 检查特定Fence值是否已完成
    pub fn is_completed(&mut self, value: FenceValue) -> bool {
        self.completed_value >= value || self.completed_value() >= value
    }

    /// 递增计数器并在队列中排入对新值的写入
    ///
    /// # 返回值
    ///
    /// 新的 fence 值，GPU 执行完之前提交的所有工作后写入
    pub fn signal(&mut self, queue: &B::Queue) -> Result<FenceValue> {
        let value = self.current_value.next();
        queue.signal(&self.fence, value.value())?;
        self.current_value = value;
        self.unsignaled_work = false;

        trace!(fence_value = value.value(), "Fence signaled");
        Ok(value)
    }

    /// 等待特定Fence值完成
    ///
    /// 完成值已经达到目标时立即返回，否则阻塞直到 GPU 写入目标值。
    pub fn wait_for_value(&mut self, value: FenceValue) -> Result<()> {
        if self.is_completed(value) {
            return Ok(());
        }

        debug!(
            target_value = value.value(),
            completed_value = self.completed_value.value(),
            "CPU waiting for GPU"
        );

        self.fence.wait_for_completion(value.value())?;
        self.blocking_waits += 1;

        // 等待返回意味着 GPU 至少到达了目标值
        let observed = self.completed_value().max(value);
        self.completed_value = observed;
        Ok(())
    }

    /// 刷新命令队列（等待所有已提交的工作完成）
    ///
    /// # 返回值
    ///
    /// 本次刷新新 signal 的 fence 值；没有未 signal 的提交时为 `None`
    pub fn flush(&mut self, queue: &B::Queue) -> Result<Option<FenceValue>> {
        let signaled = if self.unsignaled_work {
            Some(self.signal(queue)?)
        } else {
            None
        };

        self.wait_for_value(signaled.unwrap_or(self.current_value))?;
        Ok(signaled)
    }

    /// 记录一次新的提交，下一次 `flush` 需要 signal
    pub fn mark_submitted(&mut self) {
        self.unsignaled_work = true;
    }

    /// 实际阻塞等待的次数
    pub fn blocking_waits(&self) -> u64 {
        self.blocking_waits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GraphicsErrorKind;
    use crate::gfx::headless::{test_device, Headless};

    fn setup(deferred: bool) -> (GraphicsDevice<Headless>, <Headless as GraphicsBackend>::Queue) {
        let device = test_device(deferred);
        let queue = device.raw().create_command_queue().unwrap();
        (device, queue)
    }

    #[test]
    fn test_fence_value() {
        let fence = FenceValue::new(1);
        assert_eq!(fence.value(), 1);
        assert_eq!(fence.next().value(), 2);
        assert!(FenceValue::new(1) < FenceValue::new(2));
        assert_eq!(FenceValue::default(), FenceValue::new(0));
    }

    #[test]
    fn test_three_signals_and_partial_completion() {
        let (device, queue) = setup(true);
        let mut fence = FenceManager::new(&device).unwrap();

        for _ in 0..3 {
            fence.signal(&queue).unwrap();
        }
        assert_eq!(fence.current_value().value(), 3);
        assert_eq!(fence.completed_value().value(), 0);

        // GPU 执行到 2
        device.raw().gpu().retire(2);
        fence.wait_for_value(FenceValue::new(2)).unwrap();
        assert_eq!(fence.blocking_waits(), 0);
        assert!(!fence.is_completed(FenceValue::new(3)));

        fence.wait_for_value(FenceValue::new(3)).unwrap();
        assert_eq!(fence.blocking_waits(), 1);
        assert!(fence.is_completed(FenceValue::new(3)));
    }

    #[test]
    fn test_flush_is_idempotent() {
        let (device, queue) = setup(true);
        let mut fence = FenceManager::new(&device).unwrap();

        fence.mark_submitted();
        assert_eq!(fence.flush(&queue).unwrap(), Some(FenceValue::new(1)));
        assert_eq!(fence.current_value().value(), 1);
        assert_eq!(fence.blocking_waits(), 1);

        assert_eq!(fence.flush(&queue).unwrap(), None);
        assert_eq!(fence.current_value().value(), 1);
        assert_eq!(fence.blocking_waits(), 1);
    }

    #[test]
    fn test_flush_on_idle_fence_does_nothing() {
        let (device, queue) = setup(true);
        let mut fence = FenceManager::new(&device).unwrap();

        fence.flush(&queue).unwrap();
        assert_eq!(fence.current_value().value(), 0);
        assert_eq!(fence.blocking_waits(), 0);
        assert_eq!(device.raw().gpu().pending_ops(), 0);
    }

    #[test]
    fn test_flush_waits_for_outstanding_signal() {
        let (device, queue) = setup(true);
        let mut fence = FenceManager::new(&device).unwrap();

        fence.signal(&queue).unwrap();
        fence.flush(&queue).unwrap();
        // 没有新提交，只等待已有的 signal
        assert_eq!(fence.current_value().value(), 1);
        assert_eq!(fence.blocking_waits(), 1);
    }

    #[test]
    fn test_completed_value_is_monotonic() {
        let (device, queue) = setup(false);
        let mut fence = FenceManager::new(&device).unwrap();

        fence.signal(&queue).unwrap();
        fence.signal(&queue).unwrap();
        assert_eq!(fence.completed_value().value(), 2);
        assert_eq!(fence.completed_value().value(), 2);
        assert!(fence.is_completed(FenceValue::new(1)));
    }

    #[test]
    fn test_unreachable_wait_is_device_lost() {
        let (device, _queue) = setup(true);
        let mut fence = FenceManager::new(&device).unwrap();

        let err = fence.wait_for_value(FenceValue::new(5)).unwrap_err();
        assert_eq!(err.graphics_kind(), Some(GraphicsErrorKind::DeviceLost));
    }
}
