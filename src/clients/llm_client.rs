//! LLM 生成客户端
//!
//! 封装远程生成调用，负责有限次数的退避重试，并暴露 token 用量。
//!
//! - `CompletionBackend`：单次调用，不做任何重试
//! - `LlmClient`：在后端之上实现重试策略，等待期间可被取消

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::GenerationError;

/// 一次生成请求的全部参数
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// 生成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// 远程生成服务的单次调用
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<Completion, GenerationError>;
}

/// 兼容 OpenAI Chat Completions 接口的后端
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    request_timeout: Duration,
}

impl OpenAiBackend {
    /// 创建新的后端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            request_timeout: config.request_timeout(),
        }
    }

    fn build_request(
        request: &GenerationRequest,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, OpenAIError> {
        let mut messages = Vec::with_capacity(2);

        if !request.system_prompt.is_empty() {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_prompt.as_str())
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user_prompt.as_str())
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_output_tokens)
            .build()
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
        debug!("调用 LLM API，模型: {}", request.model);
        debug!("用户消息长度: {} 字符", request.user_prompt.len());

        let body = Self::build_request(request).map_err(|e| GenerationError::Api {
            model: request.model.clone(),
            message: e.to_string(),
        })?;

        let response =
            match tokio::time::timeout(self.request_timeout, self.client.chat().create(body)).await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(classify_error(&request.model, e)),
                Err(_) => {
                    return Err(GenerationError::Timeout(format!(
                        "{} 秒内未收到响应",
                        self.request_timeout.as_secs()
                    )))
                }
            };

        debug!("LLM API 调用成功");

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GenerationError::EmptyContent {
                model: request.model.clone(),
            })?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Completion {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }
}

/// 把 SDK 错误映射到重试分类
fn classify_error(model: &str, err: OpenAIError) -> GenerationError {
    match &err {
        OpenAIError::Reqwest(e) if e.is_timeout() => GenerationError::Timeout(err.to_string()),
        OpenAIError::Reqwest(e) if e.status().map(|s| s.as_u16()) == Some(429) => {
            GenerationError::RateLimited(err.to_string())
        }
        OpenAIError::ApiError(api) if is_rate_limit_message(&api.message, api.r#type.as_deref()) => {
            GenerationError::RateLimited(api.message.clone())
        }
        _ => GenerationError::Api {
            model: model.to_string(),
            message: err.to_string(),
        },
    }
}

fn is_rate_limit_message(message: &str, error_type: Option<&str>) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || error_type.is_some_and(|t| t.contains("rate_limit") || t == "requests" || t == "tokens")
}

/// 退避重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: config.retry_base_delay(),
        }
    }

    /// 第 `attempt` 次（从 0 开始）失败后的等待时长：`base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// 带重试的生成客户端
pub struct LlmClient<B> {
    backend: B,
    policy: RetryPolicy,
}

impl LlmClient<OpenAiBackend> {
    /// 按配置创建 OpenAI 客户端
    pub fn from_config(config: &Config) -> Self {
        Self::with_policy(OpenAiBackend::new(config), RetryPolicy::from_config(config))
    }
}

impl<B: CompletionBackend> LlmClient<B> {
    pub fn with_policy(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 发送生成请求
    ///
    /// 频率限制和超时会按 `base * 2^attempt` 退避后重试，直到用完尝试次数；
    /// 其他错误立即返回。请求进行中或等待期间 `cancel` 被触发时，返回 `Cancelled`。
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Completion, GenerationError> {
        let mut last_error = String::new();

        for attempt in 0..self.policy.max_attempts {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                result = self.backend.complete(request) => result,
            };

            match result {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retryable() => {
                    let wait = self.policy.delay_for(attempt);
                    warn!(
                        "重试 ({}/{})，原因: {}，等待 {:?}...",
                        attempt + 1,
                        self.policy.max_attempts,
                        e,
                        wait
                    );
                    last_error = e.to_string();

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(e) => {
                    warn!("LLM API 调用失败: {}", e);
                    return Err(e);
                }
            }
        }

        Err(GenerationError::MaxRetriesExceeded {
            attempts: self.policy.max_attempts,
            last: last_error,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{answer, ScriptedBackend};
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You are a domain expert.".to_string(),
            user_prompt: "Explain judicial review.".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.5,
            max_output_tokens: 1500,
        }
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limit_message("Rate limit reached for gpt-4o", None));
        assert!(is_rate_limit_message("slow down", Some("tokens")));
        assert!(!is_rate_limit_message("Invalid API key", Some("invalid_request_error")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_retryable_failures_then_success() {
        let backend = ScriptedBackend::new(vec![
            Err(GenerationError::RateLimited("429".into())),
            Err(GenerationError::Timeout("slow".into())),
            Ok(answer("ok")),
        ]);
        let client = LlmClient::with_policy(backend, RetryPolicy::default());

        let start = tokio::time::Instant::now();
        let completion = client
            .generate(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(completion.text, "ok");
        let calls = client.backend().call_times();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(2));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(4));
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_after_one_attempt() {
        let backend = ScriptedBackend::new(vec![Err(GenerationError::Api {
            model: "gpt-4o".into(),
            message: "invalid api key".into(),
        })]);
        let client = LlmClient::with_policy(backend, RetryPolicy::default());

        let err = client
            .generate(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Api { .. }));
        assert_eq!(client.backend().call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_max_retries() {
        let backend = ScriptedBackend::new(vec![
            Err(GenerationError::RateLimited("1".into())),
            Err(GenerationError::RateLimited("2".into())),
            Err(GenerationError::RateLimited("3".into())),
        ]);
        let client = LlmClient::with_policy(backend, RetryPolicy::default());

        let err = client
            .generate(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            GenerationError::MaxRetriesExceeded { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains('3'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.backend().call_times().len(), 3);
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff_wait() {
        let backend = ScriptedBackend::new(vec![Err(GenerationError::Timeout("t".into()))]);
        let client = LlmClient::with_policy(backend, RetryPolicy::default());
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        let err = client.generate(&request(), &cancel).await.unwrap_err();

        assert!(matches!(err, GenerationError::Cancelled));
        assert_eq!(client.backend().call_times().len(), 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    /// 一直等不到响应的后端
    struct HangingBackend;

    #[async_trait]
    impl CompletionBackend for HangingBackend {
        async fn complete(&self, _: &GenerationRequest) -> Result<Completion, GenerationError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(answer("too late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_in_flight_request() {
        let client = LlmClient::with_policy(HangingBackend, RetryPolicy::default());
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_secs(3));

        let start = tokio::time::Instant::now();
        let err = client.generate(&request(), &cancel).await.unwrap_err();

        assert!(matches!(err, GenerationError::Cancelled));
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_request() {
        let backend = ScriptedBackend::new(vec![]);
        let client = LlmClient::with_policy(backend, RetryPolicy::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.generate(&request(), &cancel).await.unwrap_err();

        assert!(matches!(err, GenerationError::Cancelled));
    }
}
