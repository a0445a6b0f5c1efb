use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, AgentResult};

/// Task生命周期状态，只能向前迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// pending -> in_progress -> {completed | failed}
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 绑定到单个worker和单个查询的可调度工作单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub worker_id: String,
    pub description: String,
    pub query: String,
    /// 数值越大优先级越高
    pub priority: i64,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        worker_id: impl Into<String>,
        description: impl Into<String>,
        query: impl Into<String>,
        priority: i64,
    ) -> Self {
        Self {
            id: id.into(),
            worker_id: worker_id.into(),
            description: description.into(),
            query: query.into(),
            priority,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// 迁移状态，拒绝任何回退或跳跃
    pub(crate) fn advance(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// 序列化为普通的键值映射
    pub fn to_map(&self) -> AgentResult<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(AgentError::validation("task did not serialize to a map")),
            Err(e) => Err(AgentError::validation(e.to_string())),
        }
    }

    /// 从键值映射重建Task
    pub fn from_map(map: Map<String, Value>) -> AgentResult<Self> {
        serde_json::from_value(Value::Object(map)).map_err(|e| AgentError::validation(e.to_string()))
    }
}

/// Worker执行一个Task的产出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub worker_id: String,
    pub content: String,
}
