use crate::error::DocumentError;
use anyhow::Result;
use docx_rs::{read_docx, DocumentChild, Paragraph, ParagraphChild, RunChild};
use std::path::Path;
use tokio::fs;

/// 从 .docx 文件加载题目列表
///
/// 每个段落去除首尾空白后，字符数不少于 `min_len` 的才视为题目，
/// 其余段落直接忽略。
pub async fn load_questions(docx_path: &Path, min_len: usize) -> Result<Vec<String>> {
    let bytes = fs::read(docx_path)
        .await
        .map_err(|e| DocumentError::ReadFailed {
            path: docx_path.display().to_string(),
            message: e.to_string(),
        })?;

    let docx = read_docx(&bytes).map_err(|e| DocumentError::ReadFailed {
        path: docx_path.display().to_string(),
        message: format!("{:?}", e),
    })?;

    let paragraphs = docx.document.children.iter().filter_map(|child| match child {
        DocumentChild::Paragraph(para) => Some(paragraph_text(para)),
        _ => None,
    });

    let questions = extract_questions(paragraphs, min_len);
    tracing::info!(
        "成功从 {} 加载 {} 道题目",
        docx_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy(),
        questions.len()
    );

    Ok(questions)
}

/// 过滤段落，保留足够长的题目
pub fn extract_questions<I>(paragraphs: I, min_len: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    paragraphs
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| p.chars().count() >= min_len)
        .collect()
}

/// 拼接段落内所有文本节点
fn paragraph_text(para: &Paragraph) -> String {
    let mut text = String::new();
    for child in &para.children {
        if let ParagraphChild::Run(run) = child {
            for rc in &run.children {
                if let RunChild::Text(t) = rc {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}
