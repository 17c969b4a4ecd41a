use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 生成服务错误
    #[error("生成服务错误: {0}")]
    Generation(#[from] GenerationError),
    /// 输出文档错误
    #[error("文档错误: {0}")]
    Document(#[from] DocumentError),
    /// 进度文件错误
    #[error("进度文件错误: {0}")]
    Progress(#[from] ProgressError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 启动前置条件不满足（面向用户的提示，不属于核心故障）
    #[error("无法开始: {0}")]
    Precondition(String),
}

/// 生成服务错误
///
/// `RateLimited` 和 `Timeout` 属于可重试的瞬时错误，其余一律立即上抛。
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 请求频率限制
    #[error("请求频率限制: {0}")]
    RateLimited(String),
    /// 请求超时
    #[error("请求超时: {0}")]
    Timeout(String),
    /// API 调用失败（不可重试）
    #[error("API 调用失败 (模型: {model}): {message}")]
    Api { model: String, message: String },
    /// 返回内容为空
    #[error("返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 重试次数耗尽
    #[error("已重试 {attempts} 次仍失败，最后一次错误: {last}")]
    MaxRetriesExceeded { attempts: u32, last: String },
    /// 等待期间收到取消请求
    #[error("请求已取消")]
    Cancelled,
}

impl GenerationError {
    /// 是否属于可退避重试的错误类别
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout(_))
    }
}

/// 输出文档错误
#[derive(Debug, Error)]
pub enum DocumentError {
    /// 打开已有文档失败
    #[error("打开文档失败 ({path}): {message}")]
    OpenFailed { path: String, message: String },
    /// 保存文档失败（文件可能被其他程序占用）
    #[error("保存文档失败 ({path}): {message}")]
    SaveFailed { path: String, message: String },
    /// 文档句柄已不可用（保存任务异常退出）
    #[error("文档不可用: {0}")]
    Unavailable(String),
    /// 读取输入文档失败
    #[error("读取输入文档失败 ({path}): {message}")]
    ReadFailed { path: String, message: String },
}

/// 进度文件错误
#[derive(Debug, Error)]
pub enum ProgressError {
    /// 写入进度文件失败
    #[error("写入进度文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 删除进度文件失败
    #[error("删除进度文件失败 ({path}): {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("进度序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值超出允许范围
    #[error("配置项 {field} 的值 {value} 无效: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {message}")]
    FileParseFailed { path: String, message: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建前置条件错误
    pub fn precondition(message: impl Into<String>) -> Self {
        AppError::Precondition(message.into())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(GenerationError::RateLimited("429".into()).is_retryable());
        assert!(GenerationError::Timeout("30s".into()).is_retryable());
        assert!(!GenerationError::Cancelled.is_retryable());
        assert!(!GenerationError::EmptyContent {
            model: "gpt-4o".into()
        }
        .is_retryable());
        assert!(!GenerationError::MaxRetriesExceeded {
            attempts: 3,
            last: "429".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_generation_error_wraps_into_app_error() {
        let err: AppError = GenerationError::Timeout("deadline".into()).into();
        assert!(err.to_string().contains("请求超时"));
    }
}
