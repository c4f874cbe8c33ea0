//! 游戏计时器
//!
//! 记录总运行时间（不含暂停时段）和帧间隔。窗口最小化时停止，恢复时继续。

use std::time::{Duration, Instant};

/// 帧计时器
#[derive(Debug, Clone)]
pub struct GameTimer {
    base_time: Instant,
    paused_time: Duration,
    stop_time: Option<Instant>,
    prev_time: Instant,
    curr_time: Instant,
    delta_time: Duration,
}

impl GameTimer {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            base_time: now,
            paused_time: Duration::ZERO,
            stop_time: None,
            prev_time: now,
            curr_time: now,
            delta_time: Duration::ZERO,
        }
    }

    /// 总运行时间（秒），不计暂停时段
    pub fn total_time(&self) -> f32 {
        // 停止时从 stop_time 计算，避免把停止后的时间计入
        let end = self.stop_time.unwrap_or(self.curr_time);
        end.saturating_duration_since(self.base_time)
            .saturating_sub(self.paused_time)
            .as_secs_f32()
    }

    /// 上一帧的时长（秒）
    pub fn delta_time(&self) -> f32 {
        self.delta_time.as_secs_f32()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_time.is_some()
    }

    /// 在进入消息循环前调用
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    /// 从暂停状态恢复
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// 暂停计时
    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    /// 每帧调用一次
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn reset_at(&mut self, now: Instant) {
        *self = Self::starting_at(now);
    }

    fn start_at(&mut self, now: Instant) {
        if let Some(stop_time) = self.stop_time.take() {
            self.paused_time += now.saturating_duration_since(stop_time);
            // 暂停期间的 prev_time 已失效
            self.prev_time = now;
        }
    }

    fn stop_at(&mut self, now: Instant) {
        if self.stop_time.is_none() {
            self.stop_time = Some(now);
        }
    }

    fn tick_at(&mut self, now: Instant) {
        if self.is_stopped() {
            self.delta_time = Duration::ZERO;
            return;
        }

        self.curr_time = now;
        // saturating: 处理器切换等情况下也保证非负
        self.delta_time = now.saturating_duration_since(self.prev_time);
        self.prev_time = now;
    }
}

impl Default for GameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_tick_measures_delta() {
        let t0 = Instant::now();
        let mut timer = GameTimer::starting_at(t0);

        timer.tick_at(t0 + ms(16));
        assert!((timer.delta_time() - 0.016).abs() < 1e-4);

        timer.tick_at(t0 + ms(48));
        assert!((timer.delta_time() - 0.032).abs() < 1e-4);
        assert!((timer.total_time() - 0.048).abs() < 1e-4);
    }

    #[test]
    fn test_paused_time_is_excluded() {
        let t0 = Instant::now();
        let mut timer = GameTimer::starting_at(t0);

        timer.tick_at(t0 + ms(100));
        timer.stop_at(t0 + ms(100));
        assert!(timer.is_stopped());

        // 暂停期间 tick 的间隔为 0
        timer.tick_at(t0 + ms(300));
        assert_eq!(timer.delta_time(), 0.0);
        assert!((timer.total_time() - 0.1).abs() < 1e-4);

        timer.start_at(t0 + ms(600));
        timer.tick_at(t0 + ms(650));
        assert!((timer.delta_time() - 0.05).abs() < 1e-4);
        assert!((timer.total_time() - 0.15).abs() < 1e-4);
    }

    #[test]
    fn test_stop_twice_keeps_first_stop() {
        let t0 = Instant::now();
        let mut timer = GameTimer::starting_at(t0);
        timer.tick_at(t0 + ms(10));
        timer.stop_at(t0 + ms(10));
        timer.stop_at(t0 + ms(500));
        timer.start_at(t0 + ms(510));
        timer.tick_at(t0 + ms(520));
        assert!((timer.total_time() - 0.02).abs() < 1e-4);
    }

    #[test]
    fn test_reset_clears_state() {
        let t0 = Instant::now();
        let mut timer = GameTimer::starting_at(t0);
        timer.stop_at(t0 + ms(5));
        timer.reset_at(t0 + ms(10));
        assert!(!timer.is_stopped());
        assert_eq!(timer.total_time(), 0.0);
    }
}
