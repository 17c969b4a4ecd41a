use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 每个回答允许的最大输出 token 数
pub const MAX_OUTPUT_TOKENS: u32 = 1500;

/// 段落长度低于该值时不视为题目
pub const MIN_QUESTION_LENGTH: usize = 15;

/// 找不到指定角色时使用的兜底角色
pub const FALLBACK_PROFILE: &str = "General Professional";

/// 内置系统指令（角色）
pub static BUILTIN_PROFILES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "UPSC Mains Expert" => "You are a UPSC Civil Services expert. Answer strictly in UPSC Mains format: Introduction, Body (with headings & bullets), and Conclusion.",
    "UPSC Ethics Expert" => "You are an expert in UPSC Ethics. Provide answers with real-life examples, case studies, and ethical frameworks.",
    "UPSC GS Expert" => "You are a UPSC General Studies expert. Provide detailed, well-structured answers with relevant data and examples.",
    "UPSC Essay Expert" => "You are an expert essay writer for UPSC. Craft comprehensive essays with clear introductions, coherent arguments, and impactful conclusions.",
    "AI Tutor" => "You are an AI tutor. Explain concepts clearly and concisely, using examples and analogies where appropriate.",
    "Tech Specialist" => "You are a technology specialist. Provide detailed technical explanations and insights.",
    "Medical Expert" => "You are a medical expert. Provide accurate and detailed medical information and explanations.",
    "Legal Advisor" => "You are a legal advisor. Provide clear and precise legal explanations and advice.",
    "Financial Analyst" => "You are a financial analyst. Provide detailed financial insights and analysis.",
    "Scientific Researcher" => "You are a scientific researcher. Provide thorough and evidence-based scientific explanations.",
    "Creative Writer" => "You are a creative writer. Craft engaging and imaginative content with vivid descriptions.",
    "General Professional" => "You are a domain expert. Answer clearly and professionally.",
};

/// 程序配置
///
/// 加载顺序：默认值 → TOML 配置文件（可选）→ 环境变量
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 采样温度，取值 0.0 ~ 1.0
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// 当前选用的角色名称
    pub profile: String,
    /// 直接指定系统指令（优先于角色）
    pub system_prompt: Option<String>,
    /// 自定义角色，覆盖或补充内置角色
    pub profiles: HashMap<String, String>,

    // --- 文件配置 ---
    /// 输入题目文档（.docx）
    pub input_path: Option<PathBuf>,
    /// 输出答案文档，缺省为 `<输入文件名>_Answers.docx`
    pub output_path: Option<PathBuf>,
    /// 进度文件存放目录
    pub progress_dir: PathBuf,
    /// 每个答案后插入分页符
    pub page_break: bool,
    pub min_question_length: usize,

    // --- 运行控制 ---
    /// 暂停时的轮询间隔（毫秒）
    pub pause_poll_ms: u64,
    /// 控制端消费消息队列的间隔（毫秒）
    pub queue_poll_ms: u64,
    pub retry_max_attempts: u32,
    /// 退避基准时长（毫秒），第 n 次重试等待 base * 2^n
    pub retry_base_delay_ms: u64,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,

    // --- 日志 ---
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            temperature: 0.5,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            profile: "UPSC Mains Expert".to_string(),
            system_prompt: None,
            profiles: HashMap::new(),
            input_path: None,
            output_path: None,
            progress_dir: PathBuf::from("."),
            page_break: false,
            min_question_length: MIN_QUESTION_LENGTH,
            pause_poll_ms: 500,
            queue_poll_ms: 100,
            retry_max_attempts: 3,
            retry_base_delay_ms: 2000,
            request_timeout_secs: 120,
            verbose_logging: false,
            output_log_file: "run.log".to_string(),
        }
    }
}

impl Config {
    /// 加载配置文件（若存在）并应用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) if path.exists() => Self::from_toml_file(path)?,
            _ => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件解析配置，缺失字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::FileParseFailed { message, .. } => ConfigError::FileParseFailed {
                path: path.display().to_string(),
                message,
            }
            .into(),
            other => other.into(),
        })
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::FileParseFailed {
            path: String::new(),
            message: e.to_string(),
        })
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.llm_api_key = v;
        }
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            self.llm_api_base_url = v;
        }
        if let Ok(v) = std::env::var("AUTODOC_MODEL") {
            self.llm_model_name = v;
        }
        if let Some(v) = parse_env::<f32>("AUTODOC_TEMPERATURE", "f32")? {
            self.temperature = v;
        }
        if let Ok(v) = std::env::var("AUTODOC_PROFILE") {
            self.profile = v;
        }
        if let Ok(v) = std::env::var("AUTODOC_INPUT") {
            self.input_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("AUTODOC_OUTPUT") {
            self.output_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("AUTODOC_PROGRESS_DIR") {
            self.progress_dir = PathBuf::from(v);
        }
        if let Some(v) = parse_env::<bool>("AUTODOC_PAGE_BREAK", "bool")? {
            self.page_break = v;
        }
        if let Some(v) = parse_env::<bool>("VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        if let Ok(v) = std::env::var("OUTPUT_LOG_FILE") {
            self.output_log_file = v;
        }
        Ok(self)
    }

    /// 校验取值范围
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "temperature".to_string(),
                value: self.temperature.to_string(),
                reason: "必须在 0.0 到 1.0 之间".to_string(),
            });
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_max_attempts".to_string(),
                value: "0".to_string(),
                reason: "至少需要尝试一次".to_string(),
            });
        }
        Ok(())
    }

    /// 解析本次运行使用的系统指令
    ///
    /// 优先级：显式指定 → 自定义角色 → 内置角色 → 兜底角色
    pub fn system_prompt(&self) -> String {
        if let Some(prompt) = self.system_prompt.as_deref().map(str::trim) {
            if !prompt.is_empty() {
                return prompt.to_string();
            }
        }
        if let Some(prompt) = self.profiles.get(&self.profile) {
            return prompt.trim().to_string();
        }
        BUILTIN_PROFILES
            .get(self.profile.as_str())
            .or_else(|| BUILTIN_PROFILES.get(FALLBACK_PROFILE))
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// 所有可用角色名称（内置 + 自定义），按名称排序
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_PROFILES
            .keys()
            .map(|k| k.to_string())
            .chain(self.profiles.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// 配置的角色不存在时给出提示，列出全部可用角色
    ///
    /// 显式指定了系统指令时角色不生效，不提示。
    pub fn unknown_profile_notice(&self) -> Option<String> {
        if self
            .system_prompt
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
        {
            return None;
        }
        let names = self.profile_names();
        if names.iter().any(|n| n == &self.profile) {
            return None;
        }
        Some(format!(
            "未知角色 \"{}\"，改用 \"{}\"。可用角色: {}",
            self.profile,
            FALLBACK_PROFILE,
            names.join(", ")
        ))
    }

    /// 输出文档路径，未配置时放在输入文件旁边
    pub fn resolve_output_path(&self, input: &Path) -> PathBuf {
        if let Some(path) = &self.output_path {
            return path.clone();
        }
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        input.with_file_name(format!("{}_Answers.docx", stem))
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(
    var_name: &str,
    expected_type: &str,
) -> std::result::Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
