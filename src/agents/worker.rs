//! 专长Worker：检索 -> 构建专长提示词 -> 单次生成

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agents::prompt::PromptBuilder;
use crate::agents::specialization::Specialization;
use crate::error::{AgentError, AgentResult};
use crate::knowledge::KnowledgeStore;
use crate::llm::GenerationService;
use crate::orchestrator::TaskWorker;
use crate::types::{Message, Task, TaskResult};

/// 专长Worker，不持有跨任务状态
pub struct WorkerAgent {
    id: String,
    specialization: Specialization,
    generator: Arc<dyn GenerationService>,
    knowledge: Arc<dyn KnowledgeStore>,
    prompts: PromptBuilder,
    retrieval_limit: usize,
}

impl WorkerAgent {
    pub fn new(
        id: impl Into<String>,
        specialization: Specialization,
        generator: Arc<dyn GenerationService>,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            id: id.into(),
            specialization,
            generator,
            knowledge,
            prompts: PromptBuilder::default(),
            retrieval_limit: 5,
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

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn specialization(&self) -> &Specialization {
        &self.specialization
    }

    /// 按本worker的专长生成任务
    pub fn build_task(&self, query: &str) -> Task {
        let short_id = uuid::Uuid::new_v4().simple().to_string();
        Task::new(
            format!("{}-{}", self.id, &short_id[..8]),
            self.id.clone(),
            self.specialization.task_description(query),
            query,
            self.specialization.default_priority(),
        )
    }

    /// 执行单个任务，只把任务问题作为对话发给模型
    pub async fn process_task(&self, task: &Task) -> AgentResult<TaskResult> {
        if task.worker_id != self.id {
            return Err(AgentError::validation(format!(
                "task {} is assigned to {}, not {}",
                task.id, task.worker_id, self.id
            )));
        }

        let documents = match self
            .knowledge
            .query(&task.query, self.retrieval_limit, None)
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!(worker_id = %self.id, task_id = %task.id, error = %e, "⚠️ 知识库查询失败，使用空上下文继续");
                Vec::new()
            }
        };
        debug!(worker_id = %self.id, task_id = %task.id, documents = documents.len(), "检索完成");

        let system_prompt =
            self.prompts
                .worker_system_prompt(&self.specialization, task, &documents);
        let messages = [Message::user(task.query.clone())];

        let content = self.generator.generate(&system_prompt, &messages).await?;

        Ok(TaskResult {
            task_id: task.id.clone(),
            worker_id: self.id.clone(),
            content,
        })
    }
}

#[async_trait]
impl TaskWorker for WorkerAgent {
    fn worker_id(&self) -> &str {
        &self.id
    }

    async fn process_task(&self, task: &Task) -> AgentResult<TaskResult> {
        WorkerAgent::process_task(self, task).await
    }
}
