//! 请求工作流状态机
//!
//! 单agent模式: Retrieve -> Generate -> End
//! 多agent模式: Route -> Decompose -> Dispatch -> Aggregate -> Synthesize -> End，
//! Route在不使用worker时回退到单agent路径。
//! 状态机本身不持有线程，由Controller在显式循环中驱动。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{AgentError, AgentResult};

/// 运行模式，决定初始状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowMode {
    SingleAgent,
    MultiAgent,
}

impl WorkflowMode {
    pub fn initial_stage(&self) -> WorkflowStage {
        match self {
            WorkflowMode::SingleAgent => WorkflowStage::Retrieve,
            WorkflowMode::MultiAgent => WorkflowStage::Route,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStage {
    Retrieve,
    Generate,
    Route,
    Decompose,
    Dispatch,
    Aggregate,
    Synthesize,
    End,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Retrieve => "retrieve",
            WorkflowStage::Generate => "generate",
            WorkflowStage::Route => "route",
            WorkflowStage::Decompose => "decompose",
            WorkflowStage::Dispatch => "dispatch",
            WorkflowStage::Aggregate => "aggregate",
            WorkflowStage::Synthesize => "synthesize",
            WorkflowStage::End => "end",
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 驱动状态迁移的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// 知识库查询结束（失败时上下文为空）
    Retrieved,
    Generated,
    GenerationFailed,
    Routed { use_workers: bool },
    Decomposed { task_count: usize },
    /// 本批次仍处于pending/in_progress的任务数
    DispatchSettled { unsettled: usize },
    Aggregated,
    Synthesized,
    SynthesisFailed,
}

/// 纯迁移函数 (State, Event) -> State
pub fn transition(stage: WorkflowStage, event: WorkflowEvent) -> AgentResult<WorkflowStage> {
    use WorkflowEvent as E;
    use WorkflowStage as S;

    let next = match (stage, event) {
        (S::Retrieve, E::Retrieved) => S::Generate,
        (S::Generate, E::Generated | E::GenerationFailed) => S::End,
        (S::Route, E::Routed { use_workers: true }) => S::Decompose,
        (S::Route, E::Routed { use_workers: false }) => S::Retrieve,
        (S::Decompose, E::Decomposed { task_count: 0 }) => S::End,
        (S::Decompose, E::Decomposed { .. }) => S::Dispatch,
        (S::Dispatch, E::DispatchSettled { unsettled: 0 }) => S::Aggregate,
        (S::Dispatch, E::DispatchSettled { unsettled }) => {
            return Err(AgentError::Workflow(format!(
                "dispatch cannot settle with {} unfinished tasks",
                unsettled
            )));
        }
        (S::Aggregate, E::Aggregated) => S::Synthesize,
        (S::Synthesize, E::Synthesized | E::SynthesisFailed) => S::End,
        (stage, event) => {
            return Err(AgentError::Workflow(format!(
                "illegal event {:?} in stage {}",
                event, stage
            )));
        }
    };
    Ok(next)
}

/// 每个阶段的耗时记录
#[derive(Debug, Default)]
pub struct StageTiming {
    started_at: HashMap<WorkflowStage, Instant>,
    durations: Vec<(WorkflowStage, Duration)>,
}

impl StageTiming {
    pub fn start(&mut self, stage: WorkflowStage) {
        self.started_at.insert(stage, Instant::now());
    }

    pub fn end(&mut self, stage: WorkflowStage) -> Option<Duration> {
        let started = self.started_at.remove(&stage)?;
        let duration = started.elapsed();
        self.durations.push((stage, duration));
        Some(duration)
    }

    pub fn durations(&self) -> &[(WorkflowStage, Duration)] {
        &self.durations
    }

    pub fn report(&self) -> String {
        self.durations
            .iter()
            .map(|(stage, d)| format!("{}={:.3}s", stage, d.as_secs_f64()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 显式状态机：当前阶段 + 已走过的路径
#[derive(Debug)]
pub struct WorkflowMachine {
    mode: WorkflowMode,
    stage: WorkflowStage,
    path: Vec<WorkflowStage>,
    timing: StageTiming,
}

impl WorkflowMachine {
    pub fn new(mode: WorkflowMode) -> Self {
        let stage = mode.initial_stage();
        let mut timing = StageTiming::default();
        timing.start(stage);
        Self {
            mode,
            stage,
            path: vec![stage],
            timing,
        }
    }

    pub fn mode(&self) -> WorkflowMode {
        self.mode
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        self.stage == WorkflowStage::End
    }

    /// 已经访问过的阶段，按顺序
    pub fn path(&self) -> &[WorkflowStage] {
        &self.path
    }

    pub fn timing(&self) -> &StageTiming {
        &self.timing
    }

    /// 应用事件，非法事件不会改变当前阶段
    pub fn apply(&mut self, event: WorkflowEvent) -> AgentResult<WorkflowStage> {
        let next = transition(self.stage, event)?;
        debug!(from = %self.stage, to = %next, ?event, "工作流状态迁移");

        self.timing.end(self.stage);
        if next != WorkflowStage::End {
            self.timing.start(next);
        }
        self.stage = next;
        self.path.push(next);
        Ok(next)
    }

    /// 直接结束（致命错误时使用），已在End时无操作
    pub fn abort(&mut self) {
        if self.is_finished() {
            return;
        }
        debug!(from = %self.stage, "工作流中止");
        self.timing.end(self.stage);
        self.stage = WorkflowStage::End;
        self.path.push(WorkflowStage::End);
    }
}
