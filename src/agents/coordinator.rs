//! 组合根：持有Controller与worker名册

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agents::controller::ControllerAgent;
use crate::agents::prompt::PromptBuilder;
use crate::agents::rag::RagAgent;
use crate::agents::specialization::Specialization;
use crate::agents::worker::WorkerAgent;
use crate::config::Config;
use crate::error::{AgentError, AgentResult};
use crate::knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use crate::llm::{GenerationService, LLMClient};
use crate::types::WorkerReport;

pub struct Coordinator {
    controller: ControllerAgent,
    generator: Arc<dyn GenerationService>,
    knowledge: Arc<dyn KnowledgeStore>,
    prompts: PromptBuilder,
    retrieval_limit: usize,
}

impl Coordinator {
    /// 按配置中的名册注册worker
    pub fn new(
        config: &Config,
        generator: Arc<dyn GenerationService>,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> AgentResult<Self> {
        let prompts = PromptBuilder::new(config.agents.persona.clone(), config.target_language);
        let retrieval_limit = config.knowledge.retrieval_limit;

        let controller = ControllerAgent::new(generator.clone(), knowledge.clone())
            .with_prompts(prompts.clone())
            .with_retrieval_limit(retrieval_limit)
            .with_use_workers(config.agents.use_workers)
            .with_task_timeout(config.agents.task_timeout());

        let mut coordinator = Self {
            controller,
            generator,
            knowledge,
            prompts,
            retrieval_limit,
        };
        for worker in &config.agents.workers {
            coordinator.add_worker(&worker.id, worker.specialization.clone())?;
        }
        Ok(coordinator)
    }

    /// 从配置构建LLM客户端与内存知识库
    pub async fn from_config(config: &Config) -> Result<Self> {
        let client = LLMClient::new(config.llm.clone()).context("Failed to create LLM client")?;

        let store = match &config.knowledge.documents_path {
            Some(path) => InMemoryKnowledgeStore::from_json_file(path).await?,
            None => InMemoryKnowledgeStore::new(),
        };
        info!(documents = store.len().await, "📚 知识库已加载");

        let coordinator = Self::new(config, Arc::new(client), Arc::new(store))?;
        Ok(coordinator)
    }

    /// 运行时注册额外的worker
    pub fn add_worker(&mut self, worker_id: &str, specialization: Specialization) -> AgentResult<()> {
        let worker = WorkerAgent::new(
            worker_id,
            specialization,
            self.generator.clone(),
            self.knowledge.clone(),
        )
        .with_prompts(self.prompts.clone())
        .with_retrieval_limit(self.retrieval_limit);
        self.controller.register_worker(Arc::new(worker))
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.controller.worker_ids()
    }

    pub async fn process(&mut self, request: &str) -> String {
        self.controller.process(request).await
    }

    pub async fn process_with_cancel(&mut self, request: &str, cancel: &CancellationToken) -> String {
        self.controller.process_with_cancel(request, cancel).await
    }

    pub async fn try_process(&mut self, request: &str) -> Result<String, AgentError> {
        self.controller.try_process(request).await
    }

    pub fn get_worker_results(&self) -> BTreeMap<String, WorkerReport> {
        self.controller.get_worker_results()
    }

    pub fn controller(&self) -> &ControllerAgent {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ControllerAgent {
        &mut self.controller
    }

    /// 共享同一组协作方的单agent问答
    pub fn single_agent(&self) -> RagAgent {
        RagAgent::new(self.generator.clone(), self.knowledge.clone())
            .with_prompts(self.prompts.clone())
            .with_retrieval_limit(self.retrieval_limit)
    }
}
