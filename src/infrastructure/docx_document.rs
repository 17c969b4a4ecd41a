//! 输出文档 - 基础设施层
//!
//! 持有唯一的文档资源，只暴露"追加块"和"保存"两种能力
//!
//! - 不认识题目 / 断点
//! - 不处理业务流程

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use docx_rs::{
    read_docx, AbstractNumbering, BreakType, Docx, IndentLevel, Level, LevelJc, LevelText,
    NumberFormat, Numbering, NumberingId, Paragraph, Run as DocxRun, RunFonts, SpecialIndentType,
    Start, Style, StyleType,
};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::DocumentError;
use crate::models::{Block, Run};

const BULLET_NUMBERING_ID: usize = 1;
const DECIMAL_NUMBERING_ID: usize = 2;
const CODE_FONT: &str = "Consolas";
/// 半磅为单位，即 9pt
const CODE_FONT_SIZE: usize = 18;
const CODE_COLOR: &str = "006400";
const SEPARATOR_WIDTH: usize = 30;

/// 可追加内容、可保存的文档
///
/// 文档的创建和打开由调用方负责，批处理循环只追加和保存。
pub trait OutputDocument: Send {
    fn append(&mut self, block: &Block) -> Result<(), DocumentError>;

    fn save(&mut self) -> Result<(), DocumentError>;

    fn append_all(&mut self, blocks: &[Block]) -> Result<(), DocumentError> {
        for block in blocks {
            self.append(block)?;
        }
        Ok(())
    }
}

/// Word 文档（.docx）
pub struct DocxDocument {
    path: PathBuf,
    docx: Docx,
}

impl DocxDocument {
    /// 打开已有文档，不存在则新建
    ///
    /// # 参数
    /// - `path`: 输出文档路径
    ///
    /// # 返回
    /// 可追加内容的文档；已有文档无法解析时返回 `OpenFailed`
    pub fn open_or_create(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();

        let docx = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|e| DocumentError::OpenFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            let docx = read_docx(&bytes).map_err(|e| DocumentError::OpenFailed {
                path: path.display().to_string(),
                message: format!("{:?}", e),
            })?;
            debug!("打开已有文档: {}", path.display());
            docx
        } else {
            debug!("创建新文档: {}", path.display());
            new_docx()
        };

        Ok(Self { path, docx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputDocument for DocxDocument {
    fn append(&mut self, block: &Block) -> Result<(), DocumentError> {
        let paragraph = render_block(block);
        let docx = std::mem::take(&mut self.docx);
        self.docx = docx.add_paragraph(paragraph);
        Ok(())
    }

    /// 先写入同目录临时文件再原子替换，保存失败时旧文件保持完整
    fn save(&mut self) -> Result<(), DocumentError> {
        let save_failed = |message: String| DocumentError::SaveFailed {
            path: self.path.display().to_string(),
            message,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| save_failed(e.to_string()))?;
        self.docx
            .clone()
            .build()
            .pack(temp.as_file_mut())
            .map_err(|e| save_failed(e.to_string()))?;
        temp.as_file_mut()
            .flush()
            .map_err(|e| save_failed(e.to_string()))?;
        temp.persist(&self.path)
            .map_err(|e| save_failed(e.error.to_string()))?;

        debug!("文档已保存: {}", self.path.display());
        Ok(())
    }
}

/// 新文档：标题样式 + 项目符号 / 数字编号定义
fn new_docx() -> Docx {
    let heading_sizes = [(1u8, 32usize), (2, 28), (3, 26), (4, 24)];

    let mut docx = Docx::new();
    for (level, size) in heading_sizes {
        docx = docx.add_style(
            Style::new(format!("Heading{}", level), StyleType::Paragraph)
                .name(format!("Heading {}", level))
                .size(size)
                .bold(),
        );
    }

    docx.add_abstract_numbering(AbstractNumbering::new(BULLET_NUMBERING_ID).add_level(
        Level::new(
            0,
            Start::new(1),
            NumberFormat::new("bullet"),
            LevelText::new("•"),
            LevelJc::new("left"),
        )
        .indent(Some(720), Some(SpecialIndentType::Hanging(360)), None, None),
    ))
    .add_numbering(Numbering::new(BULLET_NUMBERING_ID, BULLET_NUMBERING_ID))
    .add_abstract_numbering(AbstractNumbering::new(DECIMAL_NUMBERING_ID).add_level(
        Level::new(
            0,
            Start::new(1),
            NumberFormat::new("decimal"),
            LevelText::new("%1."),
            LevelJc::new("left"),
        )
        .indent(Some(720), Some(SpecialIndentType::Hanging(360)), None, None),
    ))
    .add_numbering(Numbering::new(DECIMAL_NUMBERING_ID, DECIMAL_NUMBERING_ID))
}

fn render_block(block: &Block) -> Paragraph {
    match block {
        Block::Heading { level, text } => Paragraph::new()
            .style(&format!("Heading{}", level))
            .add_run(DocxRun::new().add_text(text.as_str())),
        Block::BulletItem(runs) => add_runs(
            Paragraph::new().numbering(NumberingId::new(BULLET_NUMBERING_ID), IndentLevel::new(0)),
            runs,
        ),
        Block::NumberedItem(runs) => add_runs(
            Paragraph::new().numbering(NumberingId::new(DECIMAL_NUMBERING_ID), IndentLevel::new(0)),
            runs,
        ),
        Block::CodeLine(line) => Paragraph::new().add_run(
            DocxRun::new()
                .add_text(line.as_str())
                .fonts(RunFonts::new().ascii(CODE_FONT).hi_ansi(CODE_FONT))
                .size(CODE_FONT_SIZE)
                .color(CODE_COLOR),
        ),
        Block::Paragraph(runs) => add_runs(Paragraph::new(), runs),
        Block::Separator => {
            Paragraph::new().add_run(DocxRun::new().add_text("_".repeat(SEPARATOR_WIDTH)))
        }
        Block::PageBreak => Paragraph::new().add_run(DocxRun::new().add_break(BreakType::Page)),
    }
}

fn add_runs(paragraph: Paragraph, runs: &[Run]) -> Paragraph {
    runs.iter().fold(paragraph, |p, run| {
        let docx_run = DocxRun::new().add_text(run.text.as_str());
        p.add_run(if run.bold { docx_run.bold() } else { docx_run })
    })
}

/// 内存文档，记录追加的块和保存次数
///
/// 克隆出的句柄共享同一份状态，方便在文档被移交给工作任务后继续检查。
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    blocks: Vec<Block>,
    /// 最近一次成功保存时的内容
    saved: Vec<Block>,
    save_count: usize,
    fail_saves: bool,
    fail_next: bool,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已有内容开始（相当于重新打开上次保存的文档）
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        let doc = Self::default();
        if let Ok(mut state) = doc.state.lock() {
            state.saved = blocks.clone();
            state.blocks = blocks;
        }
        doc
    }

    /// 之后的保存调用一律失败
    pub fn fail_saves(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_saves = fail;
        }
    }

    /// 只让下一次保存失败
    pub fn fail_next_save(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = true;
        }
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.state
            .lock()
            .map(|s| s.blocks.clone())
            .unwrap_or_default()
    }

    pub fn saved_blocks(&self) -> Vec<Block> {
        self.state
            .lock()
            .map(|s| s.saved.clone())
            .unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.state.lock().map(|s| s.save_count).unwrap_or_default()
    }

    /// 已保存内容中的题目标题（2 级，`Q` 开头）
    pub fn saved_question_headings(&self) -> Vec<String> {
        self.saved_blocks()
            .into_iter()
            .filter_map(|b| match b {
                Block::Heading { level: 2, text } if text.starts_with('Q') => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl OutputDocument for MemoryDocument {
    fn append(&mut self, block: &Block) -> Result<(), DocumentError> {
        let mut state = self.state.lock().map_err(|e| DocumentError::SaveFailed {
            path: "<memory>".to_string(),
            message: e.to_string(),
        })?;
        state.blocks.push(block.clone());
        Ok(())
    }

    fn save(&mut self) -> Result<(), DocumentError> {
        let mut state = self.state.lock().map_err(|e| DocumentError::SaveFailed {
            path: "<memory>".to_string(),
            message: e.to_string(),
        })?;
        if state.fail_saves || std::mem::take(&mut state.fail_next) {
            return Err(DocumentError::SaveFailed {
                path: "<memory>".to_string(),
                message: "文件被占用".to_string(),
            });
        }
        state.saved = state.blocks.clone();
        state.save_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    fn sample_blocks() -> Vec<Block> {
        vec![
            Block::heading(2, "Q1: Explain the doctrine of basic structure."),
            Block::heading(3, "Introduction"),
            Block::Paragraph(vec![Run::bold("Kesavananda"), Run::plain(" (1973)")]),
            Block::BulletItem(vec![Run::plain("Judicial review")]),
            Block::NumberedItem(vec![Run::plain("Federalism")]),
            Block::CodeLine("    indented".to_string()),
            Block::Separator,
            Block::PageBreak,
        ]
    }

    fn paragraph_texts(docx: &Docx) -> Vec<String> {
        docx.document
            .children
            .iter()
            .filter_map(|child| match child {
                DocumentChild::Paragraph(p) => Some(
                    p.children
                        .iter()
                        .filter_map(|c| match c {
                            ParagraphChild::Run(run) => Some(
                                run.children
                                    .iter()
                                    .filter_map(|rc| match rc {
                                        RunChild::Text(t) => Some(t.text.clone()),
                                        _ => None,
                                    })
                                    .collect::<String>(),
                            ),
                            _ => None,
                        })
                        .collect::<String>(),
                ),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_docx_save_and_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.docx");

        let mut doc = DocxDocument::open_or_create(&path).unwrap();
        doc.append_all(&sample_blocks()).unwrap();
        doc.save().unwrap();
        assert!(path.exists());

        let mut reopened = DocxDocument::open_or_create(&path).unwrap();
        reopened
            .append(&Block::heading(2, "Q2: Discuss cooperative federalism."))
            .unwrap();
        reopened.save().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let texts = paragraph_texts(&read_docx(&bytes).unwrap());
        assert!(texts.iter().any(|t| t.starts_with("Q1: Explain")));
        assert!(texts.iter().any(|t| t == "Kesavananda (1973)"));
        assert!(texts.iter().any(|t| t == &"_".repeat(SEPARATOR_WIDTH)));
        assert_eq!(texts.iter().filter(|t| t.starts_with("Q2:")).count(), 1);
    }

    #[test]
    fn test_docx_open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(
            DocxDocument::open_or_create(&path),
            Err(DocumentError::OpenFailed { .. })
        ));
    }

    #[test]
    fn test_memory_document_tracks_saved_snapshot() {
        let handle = MemoryDocument::new();
        let mut doc = handle.clone();

        doc.append(&Block::heading(2, "Q1: first")).unwrap();
        doc.save().unwrap();
        doc.append(&Block::heading(2, "Q2: second")).unwrap();

        handle.fail_saves(true);
        assert!(doc.save().is_err());

        assert_eq!(handle.blocks().len(), 2);
        assert_eq!(handle.saved_question_headings(), vec!["Q1: first"]);
        assert_eq!(handle.save_count(), 1);

        handle.fail_saves(false);
        handle.fail_next_save();
        assert!(doc.save().is_err());
        doc.save().unwrap();
        assert_eq!(handle.saved_question_headings(), vec!["Q1: first", "Q2: second"]);
    }
}
