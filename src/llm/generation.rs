//! 文本生成服务协作方接口

use async_trait::async_trait;

use crate::error::AgentResult;
use crate::types::Message;

/// 系统提示词 + 对话历史 -> 生成文本
///
/// 接口或网络失败时返回`AgentError::Generation`。
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, system_prompt: &str, messages: &[Message]) -> AgentResult<String>;
}
