//! 进度存储服务 - 业务能力层
//!
//! 每个输入文件对应一个 `progress_<hash>.json`，内容为 `{"last_index": n}`。
//! 写入走"临时文件 + 原子重命名"，写到一半失败时旧断点仍然可读。

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::ProgressError;
use crate::models::Checkpoint;

/// 根据输入文件名生成稳定的进度键
///
/// 只取文件名部分参与哈希，与文件内容无关。
pub fn progress_key(input_path: &Path) -> String {
    let name = input_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| input_path.to_string_lossy().to_string());
    blake3::hash(name.as_bytes()).to_hex().to_string()
}

/// 断点文件存储
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 断点文件完整路径
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("progress_{}.json", key))
    }

    /// 读取断点
    ///
    /// 文件不存在或内容无法解析时都返回 `None`，由调用方从头开始。
    pub fn load(&self, key: &str) -> Option<Checkpoint> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("⚠️ 无法读取进度文件 {}: {}，将从头开始", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                debug!("读取断点: {:?}", checkpoint);
                Some(checkpoint)
            }
            Err(e) => {
                warn!("⚠️ 进度文件已损坏 {}: {}，将从头开始", path.display(), e);
                None
            }
        }
    }

    /// 写入断点（原子替换）
    pub fn save(&self, key: &str, checkpoint: &Checkpoint) -> Result<(), ProgressError> {
        let path = self.path_for(key);
        let body = serde_json::to_string(checkpoint)?;
        let write_failed = |source: std::io::Error| ProgressError::WriteFailed {
            path: path.display().to_string(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(write_failed)?;
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(write_failed)?;
        temp.write_all(body.as_bytes()).map_err(write_failed)?;
        temp.as_file().sync_all().map_err(write_failed)?;
        temp.persist(&path).map_err(|e| write_failed(e.error))?;

        debug!("断点已写入: {} -> {}", path.display(), body);
        Ok(())
    }

    /// 在阻塞线程池中写入断点，供异步工作任务调用
    pub async fn persist(&self, key: &str, checkpoint: Checkpoint) -> Result<(), ProgressError> {
        let store = self.clone();
        let key = key.to_string();
        let path = self.path_for(&key);

        tokio::task::spawn_blocking(move || store.save(&key, &checkpoint))
            .await
            .map_err(|e| ProgressError::WriteFailed {
                path: path.display().to_string(),
                source: std::io::Error::other(e.to_string()),
            })?
    }

    /// 删除断点，文件不存在视为成功
    pub fn delete(&self, key: &str) -> Result<(), ProgressError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ProgressError::DeleteFailed {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}
