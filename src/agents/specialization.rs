//! Worker专长类型

use serde::{Deserialize, Serialize};

/// Worker的专长，决定任务模板、优先级与提示词前缀
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Specialization {
    /// 侧重从知识库中找出相关事实
    Retrieval,
    /// 侧重分析与推理
    Analysis,
    /// 侧重起草面向用户的回答
    Draft,
    /// 自定义专长，内容为专长描述
    Custom(String),
}

impl Specialization {
    /// 专长的简短描述
    pub fn description(&self) -> &str {
        match self {
            Specialization::Retrieval => "information retrieval",
            Specialization::Analysis => "analysis and reasoning",
            Specialization::Draft => "answer drafting",
            Specialization::Custom(description) => description,
        }
    }

    /// 拼接在基础人设之前的提示词
    pub fn prompt_prefix(&self) -> String {
        match self {
            Specialization::Retrieval => "You are a retrieval specialist. Extract the facts in the \
                 reference material that bear on the question, quote them precisely and say where \
                 they come from. Do not speculate beyond the material."
                .to_string(),
            Specialization::Analysis => "You are an analysis specialist. Reason carefully about \
                 the question using the reference material, compare alternatives, point out \
                 gaps or contradictions and state your conclusions."
                .to_string(),
            Specialization::Draft => "You are a drafting specialist. Write a clear, well \
                 structured answer to the question that could be shown to the user directly."
                .to_string(),
            Specialization::Custom(description) => format!(
                "You are a specialist in {}. Approach the question from that angle and use the \
                 reference material where it helps.",
                description
            ),
        }
    }

    /// 分解时给该专长任务的优先级，检索类最先执行
    pub fn default_priority(&self) -> i64 {
        match self {
            Specialization::Retrieval => 30,
            Specialization::Analysis => 20,
            Specialization::Draft => 10,
            Specialization::Custom(_) => 10,
        }
    }

    /// 分解时生成的任务描述
    pub fn task_description(&self, query: &str) -> String {
        match self {
            Specialization::Retrieval => format!("Collect the facts relevant to: {}", query),
            Specialization::Analysis => format!("Analyze the question: {}", query),
            Specialization::Draft => format!("Draft an answer to: {}", query),
            Specialization::Custom(description) => {
                format!("Handle the question from a {} perspective: {}", description, query)
            }
        }
    }
}

impl std::fmt::Display for Specialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Specialization::Retrieval => write!(f, "retrieval"),
            Specialization::Analysis => write!(f, "analysis"),
            Specialization::Draft => write!(f, "draft"),
            Specialization::Custom(description) => write!(f, "{}", description),
        }
    }
}

impl From<String> for Specialization {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "retrieval" => Specialization::Retrieval,
            "analysis" => Specialization::Analysis,
            "draft" => Specialization::Draft,
            _ => Specialization::Custom(value.trim().to_string()),
        }
    }
}

impl From<&str> for Specialization {
    fn from(value: &str) -> Self {
        Specialization::from(value.to_string())
    }
}

impl From<Specialization> for String {
    fn from(value: Specialization) -> Self {
        value.to_string()
    }
}
