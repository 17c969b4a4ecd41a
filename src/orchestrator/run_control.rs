//! 运行控制
//!
//! 工作任务与控制端之间唯一共享的可变状态：取消令牌和暂停标志。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// 取消 / 暂停控制句柄，克隆后共享同一份状态
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求停止，幂等
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 传给各个阻塞调用的取消令牌
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// 切换暂停状态，返回切换后是否处于暂停
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// 暂停期间按固定间隔轮询，直到恢复或被取消
    ///
    /// # 返回
    /// 可以继续运行返回 `true`，已取消返回 `false`
    pub async fn wait_while_paused(&self, poll: Duration) -> bool {
        while self.is_paused() {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(poll) => {}
            }
        }
        !self.is_cancelled()
    }
}
