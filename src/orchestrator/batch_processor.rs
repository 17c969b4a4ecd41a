//! 批量答题处理器 - 编排层
//!
//! ## 职责
//!
//! 在独立的工作任务中按顺序处理全部题目，是唯一持有文档、断点和统计的模块。
//!
//! ## 核心功能
//!
//! 1. **断点续跑**：从进度文件解析起始索引
//! 2. **逐题处理**：委托 `QuestionFlow`，单题失败只记录并跳过
//! 3. **增量持久化**：每题成功后先保存文档，再写断点；磁盘 I/O 在阻塞线程池中执行
//! 4. **暂停 / 取消**：每题开始前检查，暂停期间仍可取消
//! 5. **统计**：累计费用、预计剩余时间
//!
//! ## 断点不变量
//!
//! 断点 `last_index = k` 时，`0..=k` 中所有成功的题目都已写入磁盘上的文档。
//! 文档保存失败时不推进断点，已追加的题目记为待确认；之后任意一次保存成功
//! （下一题或收尾保存）都会把断点推进到待确认题目中的最大索引。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clients::CompletionBackend;
use crate::error::{AppError, ConfigError, DocumentError, GenerationError};
use crate::infrastructure::OutputDocument;
use crate::models::{Checkpoint, RunStats};
use crate::orchestrator::notification::{Notifier, RunOutcome};
use crate::orchestrator::run_control::RunControl;
use crate::services::ProgressStore;
use crate::utils::format_eta;
use crate::workflow::{AnswerGroup, QuestionCtx, QuestionFlow};

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub stats: RunStats,
    /// 本次运行的起始索引
    pub start_index: usize,
    pub total: usize,
    /// 已写入断点的题目索引
    pub committed: Vec<usize>,
    /// 失败跳过的题目索引
    pub failed: Vec<usize>,
}

impl RunReport {
    fn new(total: usize) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            stats: RunStats::default(),
            start_index: 0,
            total,
            committed: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// 本次运行需要处理的题目数
    pub fn attempted_range(&self) -> usize {
        self.total.saturating_sub(self.start_index)
    }
}

/// 批量答题处理器
///
/// 通过 [`BatchProcessor::run`] 消费自身，适合直接交给 `tokio::spawn`。
pub struct BatchProcessor<B, D> {
    flow: QuestionFlow<B>,
    document: Arc<Mutex<D>>,
    /// 已追加到文档、尚未被断点覆盖的题目索引
    unsaved: Vec<usize>,
    store: ProgressStore,
    progress_key: String,
    questions: Vec<String>,
    control: RunControl,
    notifier: Notifier,
    pause_poll: Duration,
}

impl<B, D> BatchProcessor<B, D>
where
    B: CompletionBackend,
    D: OutputDocument + 'static,
{
    /// 创建处理器
    ///
    /// # 参数
    /// - `flow`: 单题处理流程
    /// - `document`: 已打开的输出文档
    /// - `store` / `progress_key`: 断点存储及本输入文件的键
    /// - `questions`: 全部题目，按文档顺序
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow: QuestionFlow<B>,
        document: D,
        store: ProgressStore,
        progress_key: impl Into<String>,
        questions: Vec<String>,
        control: RunControl,
        notifier: Notifier,
        pause_poll: Duration,
    ) -> Self {
        Self {
            flow,
            document: Arc::new(Mutex::new(document)),
            unsaved: Vec::new(),
            store,
            progress_key: progress_key.into(),
            questions,
            control,
            notifier,
            pause_poll,
        }
    }

    /// 运行直到完成、取消或致命错误
    ///
    /// 无论哪种结局，都会先做收尾保存，最后发送一条 `Finished`。
    pub async fn run(mut self) -> RunReport {
        let mut report = RunReport::new(self.questions.len());

        let outcome = match self.drive(&mut report).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("🔥 工作任务发生严重错误: {}", e);
                self.notifier.log(format!("🔥 严重错误: {}", e));
                RunOutcome::Failed(e.to_string())
            }
        };

        match &outcome {
            RunOutcome::Completed => {
                if let Err(e) = self.persist(&mut report).await {
                    warn!("⚠️ 最终保存失败: {}", e);
                    self.notifier
                        .log(format!("⚠️ 最终保存失败（文件可能被占用）: {}", e));
                }
                if let Err(e) = self.store.delete(&self.progress_key) {
                    warn!("⚠️ 删除进度文件失败: {}", e);
                    self.notifier.log(format!("⚠️ 删除进度文件失败: {}", e));
                }
                self.notifier.progress(100, "Finished");
                self.notifier.log("✅ 全部题目处理完成");
            }
            RunOutcome::Cancelled | RunOutcome::Failed(_) => {
                if let Err(e) = self.persist(&mut report).await {
                    debug!("收尾保存失败（已忽略）: {}", e);
                }
                if outcome == RunOutcome::Cancelled {
                    self.notifier.log("⏹️ 已停止，进度已保留，可稍后继续");
                }
            }
        }

        report.outcome = outcome.clone();
        self.notifier.finished(outcome);
        report
    }

    async fn drive(&mut self, report: &mut RunReport) -> Result<RunOutcome, AppError> {
        self.check_settings()?;

        let total = self.questions.len();
        let checkpoint = self.store.load(&self.progress_key);
        let start = Checkpoint::resume_index(checkpoint.as_ref(), total);
        report.start_index = start;

        if start >= total && total > 0 {
            self.notifier.log("✓ 进度文件显示所有题目均已完成，无需处理");
        } else if start > 0 {
            self.notifier.log(format!("⏩ 从第 {} 题继续...", start + 1));
        }
        info!("📋 共 {} 道题，从第 {} 题开始", total, start + 1);

        let started_at = Instant::now();

        for index in start..total {
            if self.control.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            if !self.control.wait_while_paused(self.pause_poll).await {
                return Ok(RunOutcome::Cancelled);
            }

            let ctx = QuestionCtx::new(index, total);
            self.notifier.progress(ctx.percent(), ctx.label());

            let question = self.questions[index].clone();
            match self.flow.run(&question, &ctx, self.control.token()).await {
                Ok(group) => self.commit(&ctx, group, started_at, report).await,
                Err(GenerationError::Cancelled) => return Ok(RunOutcome::Cancelled),
                Err(e) => {
                    warn!("{} ❌ 处理失败，跳过: {}", ctx, e);
                    self.notifier.log(format!("❌ Q{} 出错: {}", ctx.number(), e));
                    report.stats.record_failure();
                    report.failed.push(index);
                }
            }
        }

        Ok(RunOutcome::Completed)
    }

    /// 写入一道题的结果：追加 → 保存文档 → 写断点 → 统计
    async fn commit(
        &mut self,
        ctx: &QuestionCtx,
        group: AnswerGroup,
        started_at: Instant,
        report: &mut RunReport,
    ) {
        report.stats.record_success(group.cost_usd);

        let eta = estimate_eta(
            started_at.elapsed(),
            report.stats.processed_count,
            ctx.total - ctx.number(),
        );

        let appended = self
            .document
            .lock()
            .map_err(|e| DocumentError::Unavailable(e.to_string()))
            .and_then(|mut doc| doc.append_all(&group.blocks));
        match appended {
            Ok(()) => self.unsaved.push(ctx.index),
            Err(e) => warn!("{} ⚠️ 写入文档失败: {}", ctx, e),
        }

        if let Err(e) = self.persist(report).await {
            warn!("{} ⚠️ 文档保存失败: {}", ctx, e);
            self.notifier.log("⚠️ 保存延迟（文件被占用）");
        }

        debug!("{} ✓ 完成，累计费用 ${:.6}", ctx, report.stats.cumulative_cost);
        self.notifier.stats(report.stats.cumulative_cost, eta);
    }

    /// 保存文档，成功后把断点推进到待确认题目中的最大索引
    ///
    /// 文档保存失败时原样返回错误，待确认列表保留到下一次保存。
    async fn persist(&mut self, report: &mut RunReport) -> Result<(), DocumentError> {
        self.save_document().await?;

        let Some(&last) = self.unsaved.last() else {
            return Ok(());
        };
        match self
            .store
            .persist(&self.progress_key, Checkpoint::new(last))
            .await
        {
            Ok(()) => report.committed.append(&mut self.unsaved),
            Err(e) => {
                warn!("⚠️ 写入进度文件失败: {}", e);
                self.notifier.log(format!("⚠️ 写入进度文件失败: {}", e));
            }
        }
        Ok(())
    }

    async fn save_document(&self) -> Result<(), DocumentError> {
        let document = Arc::clone(&self.document);
        tokio::task::spawn_blocking(move || {
            document
                .lock()
                .map_err(|e| DocumentError::Unavailable(e.to_string()))?
                .save()
        })
        .await
        .map_err(|e| DocumentError::Unavailable(e.to_string()))?
    }

    fn check_settings(&self) -> Result<(), ConfigError> {
        let temperature = self.flow.temperature();
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                field: "temperature".to_string(),
                value: temperature.to_string(),
                reason: "必须在 0.0 到 1.0 之间".to_string(),
            });
        }
        Ok(())
    }
}

/// 按本次运行已成功题目的平均耗时估算剩余时间
fn estimate_eta(elapsed: Duration, processed: usize, remaining: usize) -> String {
    if processed == 0 {
        return format_eta(0);
    }
    let avg_secs = elapsed.as_secs_f64() / processed as f64;
    format_eta((avg_secs * remaining as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::llm_client::testing::{answer, ScriptedBackend};
    use crate::clients::{LlmClient, RetryPolicy};
    use crate::config::Config;
    use crate::infrastructure::MemoryDocument;
    use crate::orchestrator::Notification;

    fn processor(
        script: Vec<Result<crate::clients::Completion, GenerationError>>,
        config: &Config,
        doc: &MemoryDocument,
        store: &ProgressStore,
        questions: &[&str],
    ) -> (
        BatchProcessor<ScriptedBackend, MemoryDocument>,
        RunControl,
        tokio::sync::mpsc::UnboundedReceiver<Notification>,
    ) {
        let client = LlmClient::with_policy(ScriptedBackend::new(script), RetryPolicy::default());
        let control = RunControl::new();
        let (notifier, rx) = Notifier::channel();
        let processor = BatchProcessor::new(
            QuestionFlow::new(client, config),
            doc.clone(),
            store.clone(),
            "key",
            questions.iter().map(|q| q.to_string()).collect(),
            control.clone(),
            notifier,
            Duration::from_millis(500),
        );
        (processor, control, rx)
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[test]
    fn test_estimate_eta() {
        assert_eq!(estimate_eta(Duration::from_secs(10), 0, 5), "0:00:00");
        assert_eq!(estimate_eta(Duration::from_secs(20), 2, 6), "0:01:00");
    }

    #[tokio::test]
    async fn test_completed_run_deletes_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let doc = MemoryDocument::new();
        let config = Config::default();
        let (processor, _control, mut rx) =
            processor(vec![], &config, &doc, &store, &["first?", "second?"]);

        let report = processor.run().await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.committed, vec![0, 1]);
        assert_eq!(store.load("key"), None);
        assert_eq!(doc.saved_question_headings(), vec!["Q1: first?", "Q2: second?"]);

        let notes = drain(&mut rx);
        assert_eq!(
            notes.last(),
            Some(&Notification::Finished(RunOutcome::Completed))
        );
        assert!(notes.contains(&Notification::Progress {
            percent: 100,
            label: "Finished".into()
        }));
    }

    #[tokio::test]
    async fn test_document_save_failure_does_not_advance_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let doc = MemoryDocument::new();
        doc.fail_saves(true);
        let config = Config::default();
        let (processor, _control, mut rx) =
            processor(vec![], &config, &doc, &store, &["only one?", "another?"]);

        let report = processor.run().await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.committed.is_empty());
        assert_eq!(report.stats.processed_count, 2);
        assert!(doc.saved_blocks().is_empty());
        assert!(drain(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::Log(m) if m.contains("保存延迟"))));
    }

    #[tokio::test]
    async fn test_terminal_save_commits_pending_item() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let doc = MemoryDocument::new();
        doc.fail_next_save();
        let config = Config::default();
        let (processor, _control, mut rx) =
            processor(vec![], &config, &doc, &store, &["only one?"]);

        let report = processor.run().await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.committed, vec![0]);
        assert_eq!(doc.saved_question_headings(), vec!["Q1: only one?"]);
        assert_eq!(store.load("key"), None);
        assert!(drain(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::Log(m) if m.contains("保存延迟"))));
    }

    #[tokio::test]
    async fn test_cancel_before_first_item_keeps_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        store.save("key", &Checkpoint::new(0)).unwrap();
        let doc = MemoryDocument::new();
        let config = Config::default();
        let (processor, control, _rx) =
            processor(vec![], &config, &doc, &store, &["a?", "b?", "c?"]);
        control.cancel();

        let report = processor.run().await;

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.start_index, 1);
        assert!(report.committed.is_empty());
        assert_eq!(store.load("key"), Some(Checkpoint::new(0)));
        assert_eq!(doc.save_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_temperature_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let doc = MemoryDocument::new();
        let config = Config {
            temperature: 1.7,
            ..Config::default()
        };
        let (processor, _control, mut rx) = processor(vec![], &config, &doc, &store, &["q?"]);

        let report = processor.run().await;

        assert!(matches!(report.outcome, RunOutcome::Failed(_)));
        assert!(doc.saved_question_headings().is_empty());
        assert_eq!(doc.save_count(), 1);
        assert!(matches!(
            drain(&mut rx).last(),
            Some(Notification::Finished(RunOutcome::Failed(_)))
        ));
    }

    #[tokio::test]
    async fn test_cost_accumulates_across_items() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path());
        let doc = MemoryDocument::new();
        let config = Config {
            llm_model_name: "gpt-4o".to_string(),
            ..Config::default()
        };
        let (processor, _control, mut rx) = processor(
            vec![Ok(answer("a")), Ok(answer("b"))],
            &config,
            &doc,
            &store,
            &["one?", "two?"],
        );

        let report = processor.run().await;

        assert!((report.stats.cumulative_cost - 0.0015).abs() < 1e-12);
        let costs: Vec<f64> = drain(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                Notification::Stats { cost_usd, .. } => Some(cost_usd),
                _ => None,
            })
            .collect();
        assert_eq!(costs.len(), 2);
        assert!((costs[0] - 0.00075).abs() < 1e-12);
        assert!((costs[1] - 0.0015).abs() < 1e-12);
    }
}
