//! 基于词项重叠打分的内存知识库

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AgentResult;
use crate::knowledge::{KnowledgeStore, MetadataFilter};
use crate::types::RetrievedDocument;

/// 文档文件中的一条记录
#[derive(Debug, Deserialize)]
struct DocumentRecord {
    content: String,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    content: String,
    metadata: HashMap<String, Value>,
    terms: HashSet<String>,
}

/// 内存知识库，得分 = 命中的查询词数 / 查询词总数
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从JSON数组文件加载，每项为`{content, metadata}`
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read documents file: {:?}", path))?;
        let records: Vec<DocumentRecord> =
            serde_json::from_str(&content).context("Failed to parse documents file")?;

        let store = Self::new();
        for record in records {
            store.add_document(record.content, record.metadata).await;
        }
        Ok(store)
    }

    pub async fn add_document(&self, content: impl Into<String>, metadata: HashMap<String, Value>) {
        let content = content.into();
        let terms = tokenize(&content);
        self.documents.write().await.push(StoredDocument {
            content,
            metadata,
            terms,
        });
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn query(
        &self,
        text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> AgentResult<Vec<RetrievedDocument>> {
        let query_terms = tokenize(text);
        if query_terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let documents = self.documents.read().await;
        let mut scored: Vec<(usize, f64)> = documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| matches_filter(&doc.metadata, filter))
            .filter_map(|(index, doc)| {
                let hits = query_terms.intersection(&doc.terms).count();
                (hits > 0).then(|| (index, hits as f64 / query_terms.len() as f64))
            })
            .collect();

        // 稳定排序，同分保持插入顺序
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        debug!(query = text, hits = scored.len(), "内存知识库检索完成");

        Ok(scored
            .into_iter()
            .map(|(index, score)| RetrievedDocument {
                content: documents[index].content.clone(),
                metadata: documents[index].metadata.clone(),
                relevance_score: score,
            })
            .collect())
    }
}

fn matches_filter(metadata: &HashMap<String, Value>, filter: Option<&MetadataFilter>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected)),
    }
}

/// 小写字母数字词项
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
