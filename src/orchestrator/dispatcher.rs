//! 并行分发器：按worker扇出、对全部任务扇入
//!
//! 同一个worker的任务按调度器给出的顺序串行执行，不同worker之间并发执行。
//! 调用方会阻塞到所有任务都进入终态为止。

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AgentError, AgentResult};
use crate::orchestrator::scheduler::TaskScheduler;
use crate::types::{Task, TaskResult, TaskStatus};

/// 可以执行Task的worker
#[async_trait]
pub trait TaskWorker: Send + Sync {
    fn worker_id(&self) -> &str;

    async fn process_task(&self, task: &Task) -> AgentResult<TaskResult>;
}

/// 一个Task的终态结果
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// 终态Task（completed或failed）
    pub task: Task,
    /// 成功时worker的产出
    pub result: Option<TaskResult>,
    /// 全批次内的完成序号，从0开始
    pub sequence: usize,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        self.task.status == TaskStatus::Completed
    }
}

/// 共享的批次上下文，每个worker流持有一份clone
#[derive(Clone)]
struct StreamContext {
    scheduler: Arc<Mutex<TaskScheduler>>,
    cancel: CancellationToken,
    task_timeout: Option<Duration>,
    finished: Arc<AtomicUsize>,
}

pub struct ParallelDispatcher {
    workers: HashMap<String, Arc<dyn TaskWorker>>,
    scheduler: Arc<Mutex<TaskScheduler>>,
    task_timeout: Option<Duration>,
}

impl ParallelDispatcher {
    pub fn new(
        workers: HashMap<String, Arc<dyn TaskWorker>>,
        scheduler: Arc<Mutex<TaskScheduler>>,
    ) -> Self {
        Self {
            workers,
            scheduler,
            task_timeout: None,
        }
    }

    /// 单个任务的超时时间，默认不限制
    pub fn with_task_timeout(mut self, task_timeout: Option<Duration>) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    /// 执行一批任务，返回 taskId -> 终态结果
    ///
    /// 某个worker失败、panic或超时只会让对应任务失败，不影响其它worker。
    /// 取消后尚未结束的任务全部以取消错误失败，返回的映射仍然完整。
    /// 同一个taskId只执行第一次出现的那个，重复的会被丢弃。
    pub async fn dispatch(
        &self,
        tasks_by_worker: BTreeMap<String, Vec<Task>>,
        cancel: &CancellationToken,
    ) -> HashMap<String, TaskOutcome> {
        let tasks_by_worker = dedupe_task_ids(tasks_by_worker);
        let total: usize = tasks_by_worker.values().map(Vec::len).sum();
        if total == 0 {
            debug!("分发批次为空，直接返回");
            return HashMap::new();
        }

        info!(
            workers = tasks_by_worker.len(),
            tasks = total,
            "🚀 开始并行分发任务"
        );

        let ctx = StreamContext {
            scheduler: self.scheduler.clone(),
            cancel: cancel.clone(),
            task_timeout: self.task_timeout,
            finished: Arc::new(AtomicUsize::new(0)),
        };

        let mut streams = Vec::with_capacity(tasks_by_worker.len());
        for (worker_id, tasks) in tasks_by_worker {
            if tasks.is_empty() {
                continue;
            }
            let worker = self.workers.get(&worker_id).cloned();
            let pending_tasks = tasks.clone();
            let handle = tokio::spawn(Self::run_worker_stream(
                worker_id.clone(),
                worker,
                tasks,
                ctx.clone(),
            ));
            streams.push((worker_id, pending_tasks, handle));
        }

        let (meta, handles): (Vec<_>, Vec<_>) = streams
            .into_iter()
            .map(|(worker_id, tasks, handle)| ((worker_id, tasks), handle))
            .unzip();
        let joined = join_all(handles).await;

        let mut outcomes = HashMap::with_capacity(total);
        for ((worker_id, tasks), joined) in meta.into_iter().zip(joined) {
            match joined {
                Ok(stream_outcomes) => {
                    for outcome in stream_outcomes {
                        outcomes.insert(outcome.task.id.clone(), outcome);
                    }
                }
                Err(e) => {
                    warn!(worker_id = %worker_id, error = %e, "⚠️ worker执行流异常终止");
                }
            }

            // 执行流被中断时，补齐尚未记录的任务，保证不丢任务
            for task in tasks {
                if outcomes.contains_key(&task.id) {
                    continue;
                }
                let error = AgentError::task_execution(format!(
                    "worker stream {} aborted before task finished",
                    worker_id
                ));
                let outcome = Self::record(&ctx, task, Err(error)).await;
                outcomes.insert(outcome.task.id.clone(), outcome);
            }
        }

        let failed = outcomes.values().filter(|o| !o.is_completed()).count();
        info!(
            completed = outcomes.len() - failed,
            failed,
            "✓ 并行分发完成"
        );
        outcomes
    }

    /// 单个worker的任务流，按给定顺序串行执行
    async fn run_worker_stream(
        worker_id: String,
        worker: Option<Arc<dyn TaskWorker>>,
        tasks: Vec<Task>,
        ctx: StreamContext,
    ) -> Vec<TaskOutcome> {
        debug!(worker_id = %worker_id, tasks = tasks.len(), "worker执行流启动");

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let execution = match &worker {
                None => Err(AgentError::task_execution(format!(
                    "worker {} is not registered",
                    worker_id
                ))),
                Some(_) if ctx.cancel.is_cancelled() => Err(AgentError::Cancelled),
                Some(worker) => Self::execute_one(worker.as_ref(), &task, &ctx).await,
            };

            if let Err(e) = &execution {
                warn!(worker_id = %worker_id, task_id = %task.id, error = %e, "❌ 任务执行失败");
            }
            outcomes.push(Self::record(&ctx, task, execution).await);
        }

        debug!(worker_id = %worker_id, "worker执行流结束");
        outcomes
    }

    /// 执行单个任务，捕获panic、超时与取消
    async fn execute_one(
        worker: &dyn TaskWorker,
        task: &Task,
        ctx: &StreamContext,
    ) -> AgentResult<TaskResult> {
        let guarded = async {
            match AssertUnwindSafe(worker.process_task(task)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(AgentError::task_execution(panic_message(panic))),
            }
        };

        let bounded = async {
            match ctx.task_timeout {
                Some(limit) => tokio::time::timeout(limit, guarded)
                    .await
                    .unwrap_or_else(|_| {
                        Err(AgentError::task_execution(format!(
                            "task {} timed out after {}s",
                            task.id,
                            limit.as_secs_f64()
                        )))
                    }),
                None => guarded.await,
            }
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(AgentError::Cancelled),
            result = bounded => result,
        }
    }

    /// 把执行结果写回调度器，并生成带完成序号的结果
    async fn record(
        ctx: &StreamContext,
        mut task: Task,
        execution: AgentResult<TaskResult>,
    ) -> TaskOutcome {
        let mut scheduler = ctx.scheduler.lock().await;

        let recorded = match &execution {
            Ok(result) => scheduler
                .complete_task(&task.id, serde_json::to_value(result).unwrap_or_default()),
            Err(e) => scheduler.fail_task(&task.id, e.to_string()),
        };

        if recorded {
            if let Some(updated) = scheduler.get_task(&task.id) {
                task = updated.clone();
            }
        } else {
            warn!(task_id = %task.id, "任务不在调度器的执行中状态，仅更新本地副本");
            if task.status == TaskStatus::Pending {
                task.advance(TaskStatus::InProgress);
            }
            match &execution {
                Ok(result) => {
                    if task.advance(TaskStatus::Completed) {
                        task.result = Some(serde_json::to_value(result).unwrap_or_default());
                    }
                }
                Err(e) => {
                    if task.advance(TaskStatus::Failed) {
                        task.error = Some(e.to_string());
                    }
                }
            }
        }

        let sequence = ctx.finished.fetch_add(1, Ordering::SeqCst);
        TaskOutcome {
            task,
            result: execution.ok(),
            sequence,
        }
    }
}

/// 按worker顺序保留每个taskId的第一次出现
fn dedupe_task_ids(tasks_by_worker: BTreeMap<String, Vec<Task>>) -> BTreeMap<String, Vec<Task>> {
    let mut seen = HashSet::new();
    tasks_by_worker
        .into_iter()
        .map(|(worker_id, tasks)| {
            let tasks = tasks
                .into_iter()
                .filter(|task| {
                    let first = seen.insert(task.id.clone());
                    if !first {
                        warn!(worker_id = %worker_id, task_id = %task.id, "⚠️ 重复的任务id，已丢弃");
                    }
                    first
                })
                .collect();
            (worker_id, tasks)
        })
        .collect()
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("worker panicked: {}", msg)
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex as StdMutex;

    /// 按任务id决定成功、失败或panic的测试worker
    struct ScriptedWorker {
        id: String,
        delay_ms: u64,
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl ScriptedWorker {
        fn new(id: &str, log: Arc<StdMutex<Vec<String>>>) -> Self {
            Self {
                id: id.to_string(),
                delay_ms: 0,
                log,
            }
        }

        fn with_delay(mut self, delay_ms: u64) -> Self {
            self.delay_ms = delay_ms;
            self
        }
    }

    #[async_trait]
    impl TaskWorker for ScriptedWorker {
        fn worker_id(&self) -> &str {
            &self.id
        }

        async fn process_task(&self, task: &Task) -> AgentResult<TaskResult> {
            self.log.lock().unwrap().push(format!("start:{}", task.id));
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if task.query.contains("throw") {
                return Err(AgentError::task_execution(format!(
                    "{} exploded",
                    task.id
                )));
            }
            if task.query.contains("panic") {
                panic!("worker lost its mind");
            }
            self.log.lock().unwrap().push(format!("end:{}", task.id));
            Ok(TaskResult {
                task_id: task.id.clone(),
                worker_id: self.id.clone(),
                content: format!("answer for {}", task.id),
            })
        }
    }

    /// 在任务开始之前就panic的worker，会让整个执行流异常终止
    struct BrokenStartWorker;

    impl TaskWorker for BrokenStartWorker {
        fn worker_id(&self) -> &str {
            "broken"
        }

        fn process_task<'life0, 'life1, 'async_trait>(
            &'life0 self,
            _task: &'life1 Task,
        ) -> Pin<Box<dyn Future<Output = AgentResult<TaskResult>> + Send + 'async_trait>>
        where
            'life0: 'async_trait,
            'life1: 'async_trait,
            Self: 'async_trait,
        {
            panic!("worker could not start its task")
        }
    }

    fn new_log() -> Arc<StdMutex<Vec<String>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    /// 把任务放入调度器并按调度顺序取出，组装成按worker分组的批次
    async fn schedule(
        scheduler: &Arc<Mutex<TaskScheduler>>,
        tasks: Vec<Task>,
    ) -> BTreeMap<String, Vec<Task>> {
        let mut guard = scheduler.lock().await;
        for task in tasks {
            guard.add_task(task).unwrap();
        }
        let mut batch: BTreeMap<String, Vec<Task>> = BTreeMap::new();
        while let Some(task) = guard.get_next_task() {
            batch.entry(task.worker_id.clone()).or_default().push(task);
        }
        batch
    }

    fn dispatcher_with(
        workers: Vec<Arc<dyn TaskWorker>>,
        scheduler: Arc<Mutex<TaskScheduler>>,
    ) -> ParallelDispatcher {
        let workers = workers
            .into_iter()
            .map(|w| (w.worker_id().to_string(), w))
            .collect();
        ParallelDispatcher::new(workers, scheduler)
    }

    #[tokio::test]
    async fn test_failure_is_captured_per_task() {
        let log = new_log();
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let worker: Arc<dyn TaskWorker> = Arc::new(ScriptedWorker::new("w1", log.clone()));
        let dispatcher = dispatcher_with(vec![worker], scheduler.clone());

        let batch = schedule(
            &scheduler,
            vec![
                Task::new("t1", "w1", "ok", "fine", 2),
                Task::new("t2", "w1", "bad", "please throw", 1),
            ],
        )
        .await;

        let outcomes = dispatcher.dispatch(batch, &CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes["t1"].task.status, TaskStatus::Completed);
        assert_eq!(
            outcomes["t1"].result.as_ref().unwrap().content,
            "answer for t1"
        );
        assert_eq!(outcomes["t2"].task.status, TaskStatus::Failed);
        assert!(
            outcomes["t2"]
                .task
                .error
                .as_deref()
                .unwrap()
                .contains("t2 exploded")
        );
        assert!(outcomes["t2"].result.is_none());

        let stats = scheduler.lock().await.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert!(stats.is_settled());
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty_map() {
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let dispatcher = dispatcher_with(vec![], scheduler);
        let outcomes = dispatcher
            .dispatch(BTreeMap::new(), &CancellationToken::new())
            .await;
        assert!(outcomes.is_empty());

        let mut only_empty_lists = BTreeMap::new();
        only_empty_lists.insert("w1".to_string(), Vec::new());
        let outcomes = dispatcher
            .dispatch(only_empty_lists, &CancellationToken::new())
            .await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_worker_queue_runs_in_scheduler_order() {
        let log = new_log();
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let worker: Arc<dyn TaskWorker> =
            Arc::new(ScriptedWorker::new("w1", log.clone()).with_delay(5));
        let dispatcher = dispatcher_with(vec![worker], scheduler.clone());

        let batch = schedule(
            &scheduler,
            vec![
                Task::new("low", "w1", "", "q", 1),
                Task::new("high", "w1", "", "q", 10),
                Task::new("mid", "w1", "", "q", 5),
            ],
        )
        .await;

        let outcomes = dispatcher.dispatch(batch, &CancellationToken::new()).await;

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                "start:high",
                "end:high",
                "start:mid",
                "end:mid",
                "start:low",
                "end:low"
            ]
        );
        assert_eq!(outcomes["high"].sequence, 0);
        assert_eq!(outcomes["mid"].sequence, 1);
        assert_eq!(outcomes["low"].sequence, 2);
    }

    #[tokio::test]
    async fn test_workers_run_concurrently() {
        let log = new_log();
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let slow: Arc<dyn TaskWorker> =
            Arc::new(ScriptedWorker::new("slow", log.clone()).with_delay(200));
        let fast: Arc<dyn TaskWorker> =
            Arc::new(ScriptedWorker::new("fast", log.clone()).with_delay(10));
        let dispatcher = dispatcher_with(vec![slow, fast], scheduler.clone());

        let batch = schedule(
            &scheduler,
            vec![
                Task::new("s1", "slow", "", "q", 9),
                Task::new("f1", "fast", "", "q", 1),
            ],
        )
        .await;

        let outcomes = dispatcher.dispatch(batch, &CancellationToken::new()).await;

        // 完成序号反映完成顺序而不是优先级
        assert_eq!(outcomes["f1"].sequence, 0);
        assert_eq!(outcomes["s1"].sequence, 1);

        let entries = log.lock().unwrap().clone();
        let fast_end = entries.iter().position(|e| e == "end:f1").unwrap();
        let slow_end = entries.iter().position(|e| e == "end:s1").unwrap();
        let slow_start = entries.iter().position(|e| e == "start:s1").unwrap();
        assert!(slow_start < fast_end);
        assert!(fast_end < slow_end);
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_abort_siblings() {
        let log = new_log();
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let a: Arc<dyn TaskWorker> = Arc::new(ScriptedWorker::new("a", log.clone()));
        let b: Arc<dyn TaskWorker> = Arc::new(ScriptedWorker::new("b", log.clone()));
        let dispatcher = dispatcher_with(vec![a, b], scheduler.clone());

        let batch = schedule(
            &scheduler,
            vec![
                Task::new("a1", "a", "", "panic now", 3),
                Task::new("a2", "a", "", "fine", 2),
                Task::new("b1", "b", "", "fine", 1),
            ],
        )
        .await;

        let outcomes = dispatcher.dispatch(batch, &CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes["a1"].task.status, TaskStatus::Failed);
        assert!(
            outcomes["a1"]
                .task
                .error
                .as_deref()
                .unwrap()
                .contains("worker lost its mind")
        );
        assert!(outcomes["a2"].is_completed());
        assert!(outcomes["b1"].is_completed());
    }

    #[tokio::test]
    async fn test_unregistered_worker_fails_its_tasks() {
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let dispatcher = dispatcher_with(vec![], scheduler.clone());

        let batch = schedule(&scheduler, vec![Task::new("t1", "ghost", "", "q", 1)]).await;
        let outcomes = dispatcher.dispatch(batch, &CancellationToken::new()).await;

        assert_eq!(outcomes["t1"].task.status, TaskStatus::Failed);
        assert!(
            outcomes["t1"]
                .task
                .error
                .as_deref()
                .unwrap()
                .contains("ghost")
        );
    }

    #[tokio::test]
    async fn test_cancellation_fails_remaining_tasks() {
        let log = new_log();
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let worker: Arc<dyn TaskWorker> =
            Arc::new(ScriptedWorker::new("w1", log.clone()).with_delay(5_000));
        let dispatcher = dispatcher_with(vec![worker], scheduler.clone());

        let batch = schedule(
            &scheduler,
            vec![
                Task::new("t1", "w1", "", "q", 2),
                Task::new("t2", "w1", "", "q", 1),
            ],
        )
        .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcomes = dispatcher.dispatch(batch, &cancel).await;

        assert_eq!(outcomes.len(), 2);
        for id in ["t1", "t2"] {
            assert_eq!(outcomes[id].task.status, TaskStatus::Failed);
            assert_eq!(
                outcomes[id].task.error.as_deref(),
                Some(AgentError::Cancelled.to_string().as_str())
            );
        }
        assert!(scheduler.lock().await.stats().is_settled());
    }

    #[tokio::test]
    async fn test_task_timeout_fails_slow_task() {
        let log = new_log();
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let worker: Arc<dyn TaskWorker> =
            Arc::new(ScriptedWorker::new("w1", log.clone()).with_delay(2_000));
        let dispatcher = dispatcher_with(vec![worker], scheduler.clone())
            .with_task_timeout(Some(Duration::from_millis(20)));

        let batch = schedule(&scheduler, vec![Task::new("t1", "w1", "", "q", 1)]).await;
        let outcomes = dispatcher.dispatch(batch, &CancellationToken::new()).await;

        assert_eq!(outcomes["t1"].task.status, TaskStatus::Failed);
        assert!(
            outcomes["t1"]
                .task
                .error
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test]
    async fn test_aborted_stream_backfills_its_tasks() {
        let log = new_log();
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let broken: Arc<dyn TaskWorker> = Arc::new(BrokenStartWorker);
        let healthy: Arc<dyn TaskWorker> = Arc::new(ScriptedWorker::new("healthy", log.clone()));
        let dispatcher = dispatcher_with(vec![broken, healthy], scheduler.clone());

        let batch = schedule(
            &scheduler,
            vec![
                Task::new("b1", "broken", "", "q", 3),
                Task::new("b2", "broken", "", "q", 2),
                Task::new("h1", "healthy", "", "q", 1),
            ],
        )
        .await;

        let outcomes = dispatcher.dispatch(batch, &CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 3);
        for id in ["b1", "b2"] {
            let outcome = &outcomes[id];
            assert_eq!(outcome.task.status, TaskStatus::Failed);
            assert!(outcome.result.is_none());
            let error = outcome.task.error.as_deref().unwrap();
            assert!(error.contains("worker stream broken aborted"));
        }
        assert!(outcomes["h1"].is_completed());

        let mut sequences: Vec<_> = outcomes.values().map(|o| o.sequence).collect();
        sequences.sort();
        assert_eq!(sequences, vec![0, 1, 2]);

        let stats = scheduler.lock().await.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.completed, 1);
        assert!(stats.is_settled());
    }

    #[tokio::test]
    async fn test_duplicate_task_id_runs_once() {
        let log = new_log();
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new()));
        let a: Arc<dyn TaskWorker> = Arc::new(ScriptedWorker::new("a", log.clone()));
        let b: Arc<dyn TaskWorker> = Arc::new(ScriptedWorker::new("b", log.clone()));
        let dispatcher = dispatcher_with(vec![a, b], scheduler);

        let mut batch = BTreeMap::new();
        batch.insert(
            "a".to_string(),
            vec![Task::new("dup", "a", "", "q", 1), Task::new("a2", "a", "", "q", 1)],
        );
        batch.insert("b".to_string(), vec![Task::new("dup", "b", "", "q", 1)]);

        let outcomes = dispatcher.dispatch(batch, &CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes["dup"].task.worker_id, "a");
        assert!(outcomes["dup"].is_completed());
        assert!(outcomes["a2"].is_completed());

        let entries = log.lock().unwrap().clone();
        assert_eq!(entries.iter().filter(|e| *e == "start:dup").count(), 1);
    }
}
