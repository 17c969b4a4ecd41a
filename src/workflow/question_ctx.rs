//! 题目处理上下文
//!
//! 封装"我正在处理第几题、共几题"这一信息

use std::fmt::Display;

/// 题目处理上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionCtx {
    /// 题目索引（从 0 开始，与断点一致）
    pub index: usize,

    /// 题目总数
    pub total: usize,
}

impl QuestionCtx {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }

    /// 面向用户的题号（从 1 开始）
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// 进度条标签，如 `Q3/10`
    pub fn label(&self) -> String {
        format!("Q{}/{}", self.number(), self.total)
    }

    /// 开始处理本题时的进度百分比
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.index * 100 / self.total).min(100) as u8
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[题目 {}/{}]", self.number(), self.total)
    }
}
