//! 规则运行时错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("配置缺失: {0}")]
    MissingKey(String),

    #[error("配置类型错误: {key} 期望 {expected}")]
    InvalidType { key: String, expected: String },

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("未知条件类型: {0}")]
    UnknownCondition(String),

    #[error("未知效果类型: {0}")]
    UnknownEffect(String),

    #[error("未知链执行器: {0}")]
    UnknownExecutor(String),

    #[error("效果链未找到: {0}")]
    ChainNotFound(String),

    #[error("效果链没有可用组件: {0}")]
    EmptyChain(String),

    #[error("表达式求值失败: {expression} ({reason})")]
    Expression { expression: String, reason: String },

    #[error("占位符未解析: %{0}%")]
    UnresolvedPlaceholder(String),

    #[error("编译数据类型不匹配: {0}")]
    CompileDataMismatch(String),

    #[error("效果执行失败: {0}")]
    EffectFailed(String),

    #[error("文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
