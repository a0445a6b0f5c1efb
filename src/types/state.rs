use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Message, RequestContext, Task, TaskResult, TaskStatus};

/// 单次Agent调用的状态，由该次调用独占
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub context: Option<RequestContext>,
    pub process_complete: bool,
    pub error: Option<String>,
}

impl AgentState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// 最后一条assistant消息
    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// 一个Task在终态时的汇总，供聚合与诊断使用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub task_id: String,
    pub worker_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerReport {
    /// 从终态Task构建，result中的内容按TaskResult解析
    pub fn from_task(task: &Task) -> Self {
        let content = task
            .result
            .as_ref()
            .and_then(|v| serde_json::from_value::<TaskResult>(v.clone()).ok())
            .map(|r| r.content);

        Self {
            task_id: task.id.clone(),
            worker_id: task.worker_id.clone(),
            status: task.status,
            content,
            error: task.error.clone(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Controller在一次请求生命周期内独占的状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub messages: Vec<Message>,
    pub workers: BTreeMap<String, AgentState>,
    pub active_workers: BTreeSet<String>,
    pub completed_workers: BTreeSet<String>,
    pub tasks: Vec<Task>,
    /// 按完成顺序排列，而非优先级顺序
    pub results: Vec<WorkerReport>,
    pub use_workers: bool,
    /// 单agent回退路径使用的检索上下文
    pub context: Option<RequestContext>,
    pub error: Option<String>,
}

impl ControllerState {
    pub fn new(messages: Vec<Message>, use_workers: bool) -> Self {
        Self {
            messages,
            use_workers,
            ..Default::default()
        }
    }

    /// 记录错误，保留首个错误
    pub fn record_error(&mut self, error: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }

    /// 当前请求的原始问题
    pub fn current_request(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::User)
            .map(|m| m.content.as_str())
    }
}
