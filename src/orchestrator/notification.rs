//! 工作任务 → 控制端的消息
//!
//! 单向 FIFO 队列，控制端按固定间隔消费。

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// 运行的最终状态
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// 所有题目都已尝试，断点已删除
    Completed,
    /// 被用户停止，断点保留
    Cancelled,
    /// 循环外的致命错误
    Failed(String),
}

/// 控制端收到的消息
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Log(String),
    Progress { percent: u8, label: String },
    Stats { cost_usd: f64, eta: String },
    /// 每次运行恰好一条，且总是最后一条
    Finished(RunOutcome),
}

/// 消息发送端
///
/// 控制端已退出时静默丢弃消息，工作任务不会因此失败。
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(Notification::Log(message.into()));
    }

    pub fn progress(&self, percent: u8, label: impl Into<String>) {
        self.send(Notification::Progress {
            percent,
            label: label.into(),
        });
    }

    pub fn stats(&self, cost_usd: f64, eta: impl Into<String>) {
        self.send(Notification::Stats {
            cost_usd,
            eta: eta.into(),
        });
    }

    pub fn finished(&self, outcome: RunOutcome) {
        self.send(Notification::Finished(outcome));
    }
}
