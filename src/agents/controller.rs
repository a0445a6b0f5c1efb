//! 编排Agent：路由、分解、并行分发、聚合与汇总

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::prompt::PromptBuilder;
use crate::agents::rag::RagAgent;
use crate::agents::worker::WorkerAgent;
use crate::error::{AgentError, AgentResult};
use crate::knowledge::KnowledgeStore;
use crate::llm::GenerationService;
use crate::orchestrator::{
    ParallelDispatcher, TaskOutcome, TaskScheduler, TaskWorker, WorkflowEvent, WorkflowMachine,
    WorkflowMode, WorkflowStage,
};
use crate::types::{AgentState, ControllerState, Message, Task, WorkerReport};

/// 请求失败时返回给用户的固定回复
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, something went wrong while preparing an answer. Please try again in a moment.";

/// 编排Agent，独占ControllerState的写入
pub struct ControllerAgent {
    generator: Arc<dyn GenerationService>,
    rag: RagAgent,
    workers: BTreeMap<String, Arc<WorkerAgent>>,
    prompts: PromptBuilder,
    use_workers: bool,
    task_timeout: Option<Duration>,
    history: Vec<Message>,
    last_state: Option<ControllerState>,
}

impl ControllerAgent {
    pub fn new(generator: Arc<dyn GenerationService>, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            rag: RagAgent::new(generator.clone(), knowledge),
            generator,
            workers: BTreeMap::new(),
            prompts: PromptBuilder::default(),
            use_workers: true,
            task_timeout: None,
            history: Vec::new(),
            last_state: None,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.rag = self.rag.with_prompts(prompts.clone());
        self.prompts = prompts;
        self
    }

    pub fn with_retrieval_limit(mut self, retrieval_limit: usize) -> Self {
        self.rag = self.rag.with_retrieval_limit(retrieval_limit);
        self
    }

    pub fn with_use_workers(mut self, use_workers: bool) -> Self {
        self.use_workers = use_workers;
        self
    }

    pub fn with_task_timeout(mut self, task_timeout: Option<Duration>) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    /// 注册worker，id重复时拒绝
    pub fn register_worker(&mut self, worker: Arc<WorkerAgent>) -> AgentResult<()> {
        let id = worker.id().to_string();
        if id.trim().is_empty() {
            return Err(AgentError::validation("worker id must not be empty"));
        }
        if self.workers.contains_key(&id) {
            return Err(AgentError::validation(format!(
                "worker {} is already registered",
                id
            )));
        }
        debug!(worker_id = %id, specialization = %worker.specialization(), "注册worker");
        self.workers.insert(id, worker);
        Ok(())
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn use_workers(&self) -> bool {
        self.use_workers
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// 最近一次请求的完整状态
    pub fn last_state(&self) -> Option<&ControllerState> {
        self.last_state.as_ref()
    }

    /// 每个已注册worker一个任务，都携带原始问题
    pub fn decompose(&self, query: &str) -> Vec<Task> {
        self.workers
            .values()
            .map(|worker| worker.build_task(query))
            .collect()
    }

    /// 最近一次请求中各worker的结果，仅用于诊断
    pub fn get_worker_results(&self) -> BTreeMap<String, WorkerReport> {
        self.last_state
            .as_ref()
            .map(|state| {
                state
                    .results
                    .iter()
                    .map(|report| (report.worker_id.clone(), report.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 处理请求；失败时返回固定致歉语，错误记录在状态中
    pub async fn process(&mut self, request: &str) -> String {
        self.process_with_cancel(request, &CancellationToken::new())
            .await
    }

    pub async fn process_with_cancel(&mut self, request: &str, cancel: &CancellationToken) -> String {
        match self.try_process_with_cancel(request, cancel).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "❌ 请求处理失败，返回致歉信息");
                APOLOGY_MESSAGE.to_string()
            }
        }
    }

    /// 处理请求，失败时返回具体错误
    pub async fn try_process(&mut self, request: &str) -> AgentResult<String> {
        self.try_process_with_cancel(request, &CancellationToken::new())
            .await
    }

    pub async fn try_process_with_cancel(
        &mut self,
        request: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        let mut messages = self.history.clone();
        messages.push(Message::user(request));
        let mut state = ControllerState::new(messages, self.use_workers);

        let result = self.run_workflow(&mut state, request, cancel).await;
        match &result {
            Ok(answer) => {
                state.messages.push(Message::assistant(answer.clone()));
                self.history.push(Message::user(request));
                self.history.push(Message::assistant(answer.clone()));
            }
            Err(e) => state.record_error(e.to_string()),
        }

        self.last_state = Some(state);
        result
    }

    /// 显式驱动状态机直到End
    async fn run_workflow(
        &self,
        state: &mut ControllerState,
        request: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        let mut machine = WorkflowMachine::new(WorkflowMode::MultiAgent);
        let mut outcomes: Vec<TaskOutcome> = Vec::new();
        let mut answer: Option<String> = None;
        let mut failure: Option<AgentError> = None;

        while !machine.is_finished() {
            let event = match machine.stage() {
                WorkflowStage::Route => WorkflowEvent::Routed {
                    use_workers: state.use_workers,
                },
                WorkflowStage::Retrieve => {
                    state.context = Some(self.rag.retrieve(request).await);
                    WorkflowEvent::Retrieved
                }
                WorkflowStage::Generate => {
                    let context = state.context.clone().unwrap_or_default();
                    match self.rag.generate(&context, &state.messages, cancel).await {
                        Ok(text) => {
                            answer = Some(text);
                            WorkflowEvent::Generated
                        }
                        Err(e) => {
                            state.record_error(e.to_string());
                            failure = Some(e);
                            WorkflowEvent::GenerationFailed
                        }
                    }
                }
                WorkflowStage::Decompose => {
                    state.tasks = self.decompose(request);
                    info!(tasks = state.tasks.len(), "🧩 请求已分解");
                    if state.tasks.is_empty() {
                        let e = AgentError::Workflow("decomposition produced no tasks".to_string());
                        state.record_error(e.to_string());
                        failure = Some(e);
                    }
                    WorkflowEvent::Decomposed {
                        task_count: state.tasks.len(),
                    }
                }
                WorkflowStage::Dispatch => match self.dispatch(state, cancel).await {
                    Ok((batch, unsettled)) => {
                        outcomes = batch;
                        WorkflowEvent::DispatchSettled { unsettled }
                    }
                    Err(e) => {
                        state.record_error(e.to_string());
                        failure = Some(e);
                        machine.abort();
                        break;
                    }
                },
                WorkflowStage::Aggregate => {
                    Self::aggregate(state, std::mem::take(&mut outcomes));
                    WorkflowEvent::Aggregated
                }
                WorkflowStage::Synthesize => match self.synthesize(state, cancel).await {
                    Ok(text) => {
                        answer = Some(text);
                        WorkflowEvent::Synthesized
                    }
                    Err(e) => {
                        state.record_error(e.to_string());
                        failure = Some(e);
                        WorkflowEvent::SynthesisFailed
                    }
                },
                WorkflowStage::End => break,
            };

            if let Err(e) = machine.apply(event) {
                state.record_error(e.to_string());
                if failure.is_none() {
                    failure = Some(e);
                }
                machine.abort();
            }
        }

        let path = machine
            .path()
            .iter()
            .map(WorkflowStage::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        info!(path = %path, timing = %machine.timing().report(), "✓ 工作流结束");

        match failure {
            Some(e) => Err(e),
            None => answer
                .ok_or_else(|| AgentError::Workflow("workflow ended without an answer".to_string())),
        }
    }

    /// 把任务交给调度器，按worker分组后并行执行；返回结果与未结束的任务数
    async fn dispatch(
        &self,
        state: &mut ControllerState,
        cancel: &CancellationToken,
    ) -> AgentResult<(Vec<TaskOutcome>, usize)> {
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));

        let mut tasks_by_worker: BTreeMap<String, Vec<Task>> = BTreeMap::new();
        {
            let mut guard = scheduler.lock().await;
            for task in &state.tasks {
                guard.add_task(task.clone())?;
            }
            while let Some(task) = guard.get_next_task() {
                tasks_by_worker
                    .entry(task.worker_id.clone())
                    .or_default()
                    .push(task);
            }
        }
        state.active_workers = tasks_by_worker.keys().cloned().collect();

        let workers: HashMap<String, Arc<dyn TaskWorker>> = self
            .workers
            .iter()
            .map(|(id, worker)| (id.clone(), worker.clone() as Arc<dyn TaskWorker>))
            .collect();
        let dispatcher =
            ParallelDispatcher::new(workers, scheduler.clone()).with_task_timeout(self.task_timeout);
        let batch = dispatcher.dispatch(tasks_by_worker, cancel).await;

        let guard = scheduler.lock().await;
        let stats = guard.stats();
        state.tasks = guard.tasks();
        debug!(?stats, "调度器统计");

        let mut outcomes: Vec<TaskOutcome> = batch.into_values().collect();
        outcomes.sort_by_key(|o| o.sequence);
        Ok((outcomes, stats.pending + stats.in_progress))
    }

    /// 按完成顺序收集结果，并构建每个worker的AgentState
    fn aggregate(state: &mut ControllerState, outcomes: Vec<TaskOutcome>) {
        for outcome in outcomes {
            let report = WorkerReport::from_task(&outcome.task);
            let worker_id = report.worker_id.clone();

            let mut worker_state = AgentState::new(vec![Message::user(outcome.task.query.clone())]);
            if let Some(result) = &outcome.result {
                worker_state
                    .messages
                    .push(Message::assistant(result.content.clone()));
            }
            worker_state.error = report.error.clone();
            worker_state.process_complete = report.is_completed();

            state.workers.insert(worker_id.clone(), worker_state);
            state.active_workers.remove(&worker_id);
            state.completed_workers.insert(worker_id);
            state.results.push(report);
        }

        let failed = state.results.iter().filter(|r| !r.is_completed()).count();
        if failed > 0 {
            warn!(failed, total = state.results.len(), "⚠️ 部分worker任务失败");
        }
    }

    async fn synthesize(
        &self,
        state: &ControllerState,
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let system_prompt = self.prompts.synthesis_system_prompt(&state.results);
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = self.generator.generate(&system_prompt, &state.messages) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::specialization::Specialization;
    use crate::knowledge::InMemoryKnowledgeStore;
    use crate::types::TaskStatus;
    use async_trait::async_trait;

    /// worker调用与汇总调用按系统提示词区分
    struct ScriptedGenerator {
        fail_worker: Option<&'static str>,
        fail_synthesis: bool,
    }

    #[async_trait]
    impl GenerationService for ScriptedGenerator {
        async fn generate(&self, system_prompt: &str, _messages: &[Message]) -> AgentResult<String> {
            if system_prompt.contains("## Specialist findings") {
                if self.fail_synthesis {
                    return Err(AgentError::generation("synthesis down"));
                }
                return Ok(format!("final:{}", system_prompt.matches("### [").count()));
            }
            if let Some(marker) = self.fail_worker
                && system_prompt.contains(marker)
            {
                return Err(AgentError::generation("worker down"));
            }
            Ok("partial".to_string())
        }
    }

    fn controller(generator: ScriptedGenerator) -> ControllerAgent {
        let generator: Arc<dyn GenerationService> = Arc::new(generator);
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
        let mut controller = ControllerAgent::new(generator.clone(), knowledge.clone());
        for (id, specialization) in [
            ("retrieval", Specialization::Retrieval),
            ("analysis", Specialization::Analysis),
            ("draft", Specialization::Draft),
        ] {
            controller
                .register_worker(Arc::new(WorkerAgent::new(
                    id,
                    specialization,
                    generator.clone(),
                    knowledge.clone(),
                )))
                .unwrap();
        }
        controller
    }

    #[tokio::test]
    async fn test_multi_agent_flow_synthesizes_all_findings() {
        let mut controller = controller(ScriptedGenerator {
            fail_worker: None,
            fail_synthesis: false,
        });

        let answer = controller.process("what is rust").await;
        assert_eq!(answer, "final:3");

        let state = controller.last_state().unwrap();
        assert!(state.error.is_none());
        assert_eq!(state.tasks.len(), 3);
        assert!(state.tasks.iter().all(|t| t.status == TaskStatus::Completed));
        assert_eq!(state.results.len(), 3);
        assert!(state.active_workers.is_empty());
        assert_eq!(state.completed_workers.len(), 3);
        assert_eq!(state.workers.len(), 3);
        assert_eq!(controller.history().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_worker_is_isolated() {
        let mut controller = controller(ScriptedGenerator {
            fail_worker: Some("drafting specialist"),
            fail_synthesis: false,
        });

        let answer = controller.process("q").await;
        assert_eq!(answer, "final:3");

        let results = controller.get_worker_results();
        assert_eq!(results.len(), 3);
        assert!(!results["draft"].is_completed());
        assert!(results["draft"].error.as_deref().unwrap().contains("worker down"));
        assert!(results["analysis"].is_completed());
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_typed_in_try_process() {
        let mut controller = controller(ScriptedGenerator {
            fail_worker: None,
            fail_synthesis: true,
        });

        let err = controller.try_process("q").await.unwrap_err();
        assert!(matches!(err, AgentError::Generation(_)));
        assert!(controller.last_state().unwrap().error.is_some());
        assert!(controller.history().is_empty());

        assert_eq!(controller.process("q").await, APOLOGY_MESSAGE);
    }

    #[tokio::test]
    async fn test_register_duplicate_worker_rejected() {
        let mut controller = controller(ScriptedGenerator {
            fail_worker: None,
            fail_synthesis: false,
        });
        let duplicate = Arc::new(WorkerAgent::new(
            "analysis",
            Specialization::Analysis,
            Arc::new(ScriptedGenerator {
                fail_worker: None,
                fail_synthesis: false,
            }),
            Arc::new(InMemoryKnowledgeStore::new()),
        ));
        assert!(controller.register_worker(duplicate).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_request_ends_with_error() {
        let mut controller = controller(ScriptedGenerator {
            fail_worker: None,
            fail_synthesis: false,
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = controller
            .try_process_with_cancel("q", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::Cancelled);

        let state = controller.last_state().unwrap();
        assert!(state.tasks.iter().all(|t| t.status == TaskStatus::Failed));
    }

    #[tokio::test]
    async fn test_disabled_workers_use_single_agent_path() {
        let mut controller = controller(ScriptedGenerator {
            fail_worker: None,
            fail_synthesis: false,
        })
        .with_use_workers(false);

        assert_eq!(controller.process("q").await, "partial");
        let state = controller.last_state().unwrap();
        assert!(state.context.is_some());
        assert!(state.tasks.is_empty());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_empty_roster_with_workers_enabled_is_fatal() {
        let generator: Arc<dyn GenerationService> = Arc::new(ScriptedGenerator {
            fail_worker: None,
            fail_synthesis: false,
        });
        let mut controller = ControllerAgent::new(generator, Arc::new(InMemoryKnowledgeStore::new()))
            .with_use_workers(true);

        let err = controller.try_process("X").await.unwrap_err();
        assert!(matches!(err, AgentError::Workflow(_)));

        let state = controller.last_state().unwrap();
        assert!(state.use_workers);
        assert!(state.tasks.is_empty());
        assert!(state.context.is_none());
        assert!(state.error.as_deref().unwrap().contains("no tasks"));

        assert_eq!(controller.process("X").await, APOLOGY_MESSAGE);
        assert!(controller.last_state().unwrap().error.is_some());
        assert!(controller.history().is_empty());
    }
}
