//! 知识库协作方接口

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::AgentResult;
use crate::types::RetrievedDocument;

pub mod memory_store;

pub use memory_store::InMemoryKnowledgeStore;

/// 元数据等值过滤条件
pub type MetadataFilter = HashMap<String, Value>;

/// 按相关度检索文档的知识库
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// 返回按相关度降序排列的文档，数量不超过`limit`
    async fn query(
        &self,
        text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> AgentResult<Vec<RetrievedDocument>>;
}
