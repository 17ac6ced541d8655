use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 带token校验的设备锁释放结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// 锁由该token持有并已释放
    Released,
    /// 设备当前未加锁（例如已被清扫器强制释放）
    NotHeld,
    /// 锁已被更新的分发重新获取，未做任何修改
    HeldByOther,
}

/// Agent负载的滑动窗口
///
/// 只保留窗口内的样本，窗口为空时负载视为0。
#[derive(Debug, Clone)]
pub struct LoadWindow {
    window: Duration,
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

impl LoadWindow {
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or(Duration::seconds(30)),
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, at: DateTime<Utc>, sample: f64) {
        self.samples.push_back((at, sample));
        self.prune(at);
    }

    pub fn average(&mut self, now: DateTime<Utc>) -> f64 {
        self.prune(now);
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: f64 = self.samples.iter().map(|(_, v)| v).sum();
        total / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while let Some((at, _)) = self.samples.front() {
            if *at < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}
