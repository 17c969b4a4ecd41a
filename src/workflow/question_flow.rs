//! 题目处理流程 - 流程层
//!
//! 核心职责：定义"一道题"的完整处理流程
//!
//! 流程顺序：
//! 1. 构造生成请求 → 调用 LLM（含退避重试）
//! 2. 回答转换为文档块，前置题目标题，后置分隔线 / 分页符
//! 3. 按 token 用量计算费用
//!
//! 不持有文档，不写断点，这些由编排层负责

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clients::{CompletionBackend, GenerationRequest, LlmClient};
use crate::config::Config;
use crate::error::GenerationError;
use crate::models::Block;
use crate::services::{convert, pricing};
use crate::utils::truncate_text;
use crate::workflow::question_ctx::QuestionCtx;

/// 一道题的处理结果，尚未写入文档
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerGroup {
    /// 按顺序追加到文档的块
    pub blocks: Vec<Block>,
    /// 本题费用（美元）
    pub cost_usd: f64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// 题目处理流程
///
/// - 编排单题的生成和转换
/// - 不持有文档，不接触断点
/// - 只依赖生成客户端和转换服务
pub struct QuestionFlow<B> {
    client: LlmClient<B>,
    system_prompt: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    page_break: bool,
    verbose_logging: bool,
}

impl<B: CompletionBackend> QuestionFlow<B> {
    /// 创建新的题目处理流程
    pub fn new(client: LlmClient<B>, config: &Config) -> Self {
        Self {
            client,
            system_prompt: config.system_prompt(),
            model: config.llm_model_name.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            page_break: config.page_break,
            verbose_logging: config.verbose_logging,
        }
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// 处理一道题
    ///
    /// # 参数
    /// - `question`: 题目文本，原样作为用户消息
    /// - `ctx`: 题目上下文
    /// - `cancel`: 取消令牌，请求进行中和重试等待期间均生效
    ///
    /// # 返回
    /// 待写入文档的块和本题费用
    pub async fn run(
        &self,
        question: &str,
        ctx: &QuestionCtx,
        cancel: &CancellationToken,
    ) -> Result<AnswerGroup, GenerationError> {
        if self.verbose_logging {
            info!("{} 📝 题目: {}", ctx, truncate_text(question, 80));
        }

        let request = GenerationRequest {
            system_prompt: self.system_prompt.clone(),
            user_prompt: question.to_string(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };

        let completion = self.client.generate(&request, cancel).await?;
        let cost_usd = pricing::cost(
            completion.prompt_tokens,
            completion.completion_tokens,
            &self.model,
        );
        debug!(
            "{} token 用量: 输入 {} / 输出 {}，费用 ${:.6}",
            ctx, completion.prompt_tokens, completion.completion_tokens, cost_usd
        );

        Ok(AnswerGroup {
            blocks: answer_blocks(ctx, question, &completion.text, self.page_break),
            cost_usd,
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
        })
    }
}

/// 组装一道题的全部文档块
///
/// `Q<n>: <题目>` 二级标题 → 回答内容 → 分隔线 →（可选）分页符
pub fn answer_blocks(ctx: &QuestionCtx, question: &str, answer: &str, page_break: bool) -> Vec<Block> {
    let mut blocks = vec![Block::heading(2, format!("Q{}: {}", ctx.number(), question))];
    blocks.extend(convert(answer));
    blocks.push(Block::Separator);
    if page_break {
        blocks.push(Block::PageBreak);
    }
    blocks
}
