//! Markdown 转换服务 - 业务能力层
//!
//! 只负责把一段回答文本转换为文档块，不关心文档如何保存
//!
//! 支持的子集：1~4 级标题、无序/有序列表、围栏代码块、`**加粗**`。
//! 其余内容一律按普通段落处理。

use regex::Regex;
use std::str::Split;
use std::sync::OnceLock;

use crate::models::{Block, Run};

const FENCE: &str = "```";

/// 把回答文本转换为文档块序列
///
/// 返回的迭代器是惰性的，可 `clone()` 后从头重新遍历；转换本身没有副作用。
pub fn convert(answer: &str) -> MarkdownBlocks<'_> {
    MarkdownBlocks {
        lines: answer.split('\n'),
        in_code_block: false,
    }
}

/// 逐行产出 [`Block`] 的迭代器
#[derive(Debug, Clone)]
pub struct MarkdownBlocks<'a> {
    lines: Split<'a, char>,
    in_code_block: bool,
}

impl<'a> Iterator for MarkdownBlocks<'a> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        for line in self.lines.by_ref() {
            let stripped = line.trim();

            if stripped.starts_with(FENCE) {
                self.in_code_block = !self.in_code_block;
                continue;
            }

            if self.in_code_block {
                return Some(Block::CodeLine(line.trim_end_matches('\r').to_string()));
            }

            if let Some(block) = classify_line(stripped) {
                return Some(block);
            }
        }
        None
    }
}

/// 对代码块外的一行（已去除首尾空白）进行分类
fn classify_line(stripped: &str) -> Option<Block> {
    const HEADINGS: [(&str, u8); 4] = [("#### ", 4), ("### ", 3), ("## ", 2), ("# ", 1)];

    for (prefix, level) in HEADINGS {
        if let Some(text) = stripped.strip_prefix(prefix) {
            return Some(Block::heading(level, text));
        }
    }

    if let Some(text) = stripped
        .strip_prefix("- ")
        .or_else(|| stripped.strip_prefix("* "))
    {
        return Some(Block::BulletItem(split_bold_runs(text)));
    }

    if let Some(prefix) = numbered_prefix().find(stripped) {
        return Some(Block::NumberedItem(split_bold_runs(&stripped[prefix.end()..])));
    }

    if stripped.is_empty() {
        return None;
    }

    Some(Block::Paragraph(split_bold_runs(stripped)))
}

/// 按 `**...**` 切分文本
///
/// 成对出现的标记被去掉并标记为加粗，其余部分为普通文本；
/// 不成对的 `**` 原样保留。空片段不产出。
pub fn split_bold_runs(text: &str) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut cursor = 0;

    for m in bold_pattern().find_iter(text) {
        if m.start() > cursor {
            runs.push(Run::plain(&text[cursor..m.start()]));
        }
        let inner = &text[m.start() + 2..m.end() - 2];
        if !inner.is_empty() {
            runs.push(Run::bold(inner));
        }
        cursor = m.end();
    }

    if cursor < text.len() {
        runs.push(Run::plain(&text[cursor..]));
    }

    runs
}

fn bold_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*.*?\*\*").expect("valid bold regex"))
}

/// 行首的 `12.` 以及其后的空白
fn numbered_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\s*").expect("valid numbered regex"))
}
