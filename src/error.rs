//! 编排层错误类型

use thiserror::Error;

/// 编排层统一错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// Task参数非法（重复id、空worker等）
    #[error("validation error: {0}")]
    Validation(String),

    /// 文本生成服务调用失败
    #[error("generation error: {0}")]
    Generation(String),

    /// Worker执行任务时抛出的错误（含panic、超时）
    #[error("task execution error: {0}")]
    TaskExecution(String),

    /// 知识库查询失败
    #[error("knowledge store error: {0}")]
    Knowledge(String),

    /// 非法的状态机迁移
    #[error("workflow error: {0}")]
    Workflow(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn task_execution(msg: impl Into<String>) -> Self {
        Self::TaskExecution(msg.into())
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_category() {
        assert_eq!(
            AgentError::validation("duplicate task id: t1").to_string(),
            "validation error: duplicate task id: t1"
        );
        assert_eq!(
            AgentError::generation("503").to_string(),
            "generation error: 503"
        );
        assert_eq!(AgentError::Cancelled.to_string(), "operation cancelled");
    }
}
