//! 单agent检索增强问答：Retrieve -> Generate -> End

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::controller::APOLOGY_MESSAGE;
use crate::agents::prompt::PromptBuilder;
use crate::error::{AgentError, AgentResult};
use crate::knowledge::KnowledgeStore;
use crate::llm::GenerationService;
use crate::orchestrator::{WorkflowEvent, WorkflowMachine, WorkflowMode, WorkflowStage};
use crate::types::{AgentState, Message, RequestContext};

/// 单agent问答，保留跨请求的对话历史
pub struct RagAgent {
    generator: Arc<dyn GenerationService>,
    knowledge: Arc<dyn KnowledgeStore>,
    prompts: PromptBuilder,
    retrieval_limit: usize,
    history: Vec<Message>,
    last_state: Option<AgentState>,
}

impl RagAgent {
    pub fn new(generator: Arc<dyn GenerationService>, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            generator,
            knowledge,
            prompts: PromptBuilder::default(),
            retrieval_limit: 5,
            history: Vec::new(),
            last_state: None,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retrieval_limit(mut self, retrieval_limit: usize) -> Self {
        self.retrieval_limit = retrieval_limit.max(1);
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn last_state(&self) -> Option<&AgentState> {
        self.last_state.as_ref()
    }

    /// 回答一条消息；任何失败都转换为固定的致歉语
    pub async fn process_message(&mut self, text: &str) -> String {
        self.process_message_with_cancel(text, &CancellationToken::new())
            .await
    }

    /// 可被取消的问答，取消时同样返回致歉语
    pub async fn process_message_with_cancel(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> String {
        match self.try_process_message_with_cancel(text, cancel).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "❌ 单agent问答失败");
                APOLOGY_MESSAGE.to_string()
            }
        }
    }

    /// 回答一条消息，失败时返回具体错误
    pub async fn try_process_message(&mut self, text: &str) -> AgentResult<String> {
        self.try_process_message_with_cancel(text, &CancellationToken::new())
            .await
    }

    pub async fn try_process_message_with_cancel(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        let mut messages = self.history.clone();
        messages.push(Message::user(text));
        let mut state = AgentState::new(messages);
        let mut machine = WorkflowMachine::new(WorkflowMode::SingleAgent);
        let mut failure = None;

        while !machine.is_finished() {
            let event = match machine.stage() {
                WorkflowStage::Retrieve => {
                    state.context = Some(self.retrieve(text).await);
                    WorkflowEvent::Retrieved
                }
                WorkflowStage::Generate => {
                    let context = state.context.clone().unwrap_or_default();
                    match self.generate(&context, &state.messages, cancel).await {
                        Ok(answer) => {
                            state.messages.push(Message::assistant(answer));
                            WorkflowEvent::Generated
                        }
                        Err(e) => {
                            state.error = Some(e.to_string());
                            failure = Some(e);
                            WorkflowEvent::GenerationFailed
                        }
                    }
                }
                stage => {
                    let e = AgentError::Workflow(format!("stage {} is not part of single-agent mode", stage));
                    state.error = Some(e.to_string());
                    failure = Some(e);
                    machine.abort();
                    break;
                }
            };
            if let Err(e) = machine.apply(event) {
                state.error = Some(e.to_string());
                failure = Some(e);
                machine.abort();
            }
        }
        state.process_complete = true;
        debug!(timing = %machine.timing().report(), "单agent工作流结束");

        let result = match failure {
            Some(e) => Err(e),
            None => state
                .last_reply()
                .map(str::to_string)
                .ok_or_else(|| AgentError::Workflow("workflow ended without an answer".to_string())),
        };

        if let Ok(answer) = &result {
            self.history.push(Message::user(text));
            self.history.push(Message::assistant(answer.clone()));
        }
        self.last_state = Some(state);
        result
    }

    /// 查询知识库；失败时记录日志并返回空上下文
    pub(crate) async fn retrieve(&self, query: &str) -> RequestContext {
        match self.knowledge.query(query, self.retrieval_limit, None).await {
            Ok(documents) => {
                info!(documents = documents.len(), "📚 知识库检索完成");
                RequestContext::new(query, documents)
            }
            Err(e) => {
                warn!(error = %e, "⚠️ 知识库查询失败，使用空上下文继续");
                RequestContext::new(query, Vec::new())
            }
        }
    }

    /// 基于检索上下文和对话历史生成回答
    pub(crate) async fn generate(
        &self,
        context: &RequestContext,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let system_prompt = self.prompts.rag_system_prompt(&context.documents);
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = self.generator.generate(&system_prompt, messages) => result,
        }
    }
}
