//! 基于优先级的内存任务调度器
//!
//! 高优先级先出队，同优先级按插入顺序先进先出。调度器只记录失败，
//! 从不重试或改派。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;

use crate::error::{AgentError, AgentResult};
use crate::types::{Task, TaskStatus};

/// 各状态的任务数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl SchedulerStats {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }

    /// 所有任务是否都已进入终态
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }
}

/// 堆条目（按优先级取最大，同优先级取序号最小）
#[derive(Debug, PartialEq, Eq)]
struct QueueEntry {
    priority: i64,
    sequence: u64,
    task_id: String,
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskScheduler {
    queue: BinaryHeap<QueueEntry>,
    tasks: HashMap<String, Task>,
    insertion_order: Vec<String>,
    next_sequence: u64,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以pending状态加入任务，返回任务id
    pub fn add_task(&mut self, mut task: Task) -> AgentResult<String> {
        if task.id.trim().is_empty() {
            return Err(AgentError::validation("task id must not be empty"));
        }
        if task.worker_id.trim().is_empty() {
            return Err(AgentError::validation(format!(
                "task {} has no worker assigned",
                task.id
            )));
        }
        if self.tasks.contains_key(&task.id) {
            return Err(AgentError::validation(format!(
                "duplicate task id: {}",
                task.id
            )));
        }
        if task.status != TaskStatus::Pending {
            return Err(AgentError::validation(format!(
                "task {} must be added as pending, got {}",
                task.id, task.status
            )));
        }

        task.result = None;
        task.error = None;

        let task_id = task.id.clone();
        self.queue.push(QueueEntry {
            priority: task.priority,
            sequence: self.next_sequence,
            task_id: task_id.clone(),
        });
        self.next_sequence += 1;
        self.insertion_order.push(task_id.clone());
        self.tasks.insert(task_id.clone(), task);

        debug!(task_id = %task_id, "任务已加入调度队列");
        Ok(task_id)
    }

    /// 取出最高优先级的pending任务并置为in_progress
    pub fn get_next_task(&mut self) -> Option<Task> {
        while let Some(entry) = self.queue.pop() {
            if let Some(task) = self.tasks.get_mut(&entry.task_id)
                && task.advance(TaskStatus::InProgress)
            {
                return Some(task.clone());
            }
        }
        None
    }

    /// 标记任务完成；任务不存在或不在执行中时返回false
    pub fn complete_task(&mut self, task_id: &str, result: Value) -> bool {
        let Some(task) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if !task.advance(TaskStatus::Completed) {
            return false;
        }
        task.result = Some(result);
        true
    }

    /// 标记任务失败；任务不存在或不在执行中时返回false
    pub fn fail_task(&mut self, task_id: &str, error: impl Into<String>) -> bool {
        let Some(task) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if !task.advance(TaskStatus::Failed) {
            return false;
        }
        task.error = Some(error.into());
        true
    }

    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// 按插入顺序返回全部任务
    pub fn tasks(&self) -> Vec<Task> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.tasks.get(id).cloned())
            .collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
