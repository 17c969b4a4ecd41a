use serde::{Deserialize, Serialize};

/// 一段格式一致的文本（加粗或普通）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
    pub bold: bool,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
        }
    }
}

/// 输出文档中的一个结构单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    /// 标题，级别 1 ~ 4
    Heading { level: u8, text: String },
    BulletItem(Vec<Run>),
    NumberedItem(Vec<Run>),
    /// 代码块中的一行，原样保留
    CodeLine(String),
    Paragraph(Vec<Run>),
    /// 答案之间的分隔线
    Separator,
    PageBreak,
}

impl Block {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading {
            level: level.clamp(1, 4),
            text: text.into(),
        }
    }

    /// 去掉格式后的纯文本
    pub fn plain_text(&self) -> String {
        match self {
            Block::Heading { text, .. } | Block::CodeLine(text) => text.clone(),
            Block::BulletItem(runs) | Block::NumberedItem(runs) | Block::Paragraph(runs) => {
                runs.iter().map(|r| r.text.as_str()).collect()
            }
            Block::Separator | Block::PageBreak => String::new(),
        }
    }
}
