use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 知识库返回的文档片段，检索后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub relevance_score: f64,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
            relevance_score,
        }
    }

    /// 文档来源，取metadata中的`source`字段
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// 单次请求的检索上下文，由执行检索的agent持有
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub documents: Vec<RetrievedDocument>,
    pub query: String,
}

impl RequestContext {
    pub fn new(query: impl Into<String>, documents: Vec<RetrievedDocument>) -> Self {
        Self {
            documents,
            query: query.into(),
        }
    }
}
