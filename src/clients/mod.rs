pub mod llm_client;

pub use llm_client::{
    Completion, CompletionBackend, GenerationRequest, LlmClient, OpenAiBackend, RetryPolicy,
};
