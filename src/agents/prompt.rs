//! 提示词构建

use crate::agents::specialization::Specialization;
use crate::i18n::TargetLanguage;
use crate::types::{RetrievedDocument, Task, WorkerReport};

/// 默认的基础人设
pub const DEFAULT_PERSONA: &str = include_str!("prompts/base_persona.tpl");

/// 单个文档片段在prompt中的最大字符数
const DOCUMENT_TRUNCATE_CHARS: usize = 4000;

/// 提示词构建器，持有人设与回答语言
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    language: TargetLanguage,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(None, TargetLanguage::default())
    }
}

impl PromptBuilder {
    pub fn new(persona: Option<String>, language: TargetLanguage) -> Self {
        let persona = persona
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string());
        Self { persona, language }
    }

    pub fn persona(&self) -> &str {
        self.persona.trim()
    }

    /// worker系统提示词：专长前缀 + 基础人设 + 任务 + 检索材料
    pub fn worker_system_prompt(
        &self,
        specialization: &Specialization,
        task: &Task,
        documents: &[RetrievedDocument],
    ) -> String {
        format!(
            include_str!("prompts/worker_sys.tpl"),
            specialization.prompt_prefix(),
            self.persona(),
            task.description,
            format_documents(documents),
            self.language.prompt_instruction(),
            current_date(),
        )
    }

    /// 单agent检索增强的系统提示词
    pub fn rag_system_prompt(&self, documents: &[RetrievedDocument]) -> String {
        format!(
            include_str!("prompts/rag_sys.tpl"),
            self.persona(),
            format_documents(documents),
            self.language.prompt_instruction(),
            current_date(),
        )
    }

    /// 汇总阶段的系统提示词，嵌入各worker的结果
    pub fn synthesis_system_prompt(&self, reports: &[WorkerReport]) -> String {
        format!(
            include_str!("prompts/synthesis_sys.tpl"),
            self.persona(),
            format_worker_findings(reports),
            self.language.prompt_instruction(),
            current_date(),
        )
    }
}

/// 格式化检索到的文档，按相关度顺序编号
pub fn format_documents(documents: &[RetrievedDocument]) -> String {
    if documents.is_empty() {
        return "(no relevant documents were found in the knowledge base)\n".to_string();
    }

    let mut content = String::new();
    for (i, doc) in documents.iter().enumerate() {
        content.push_str(&format!(
            "[{}] source: {}, relevance: {:.2}\n",
            i + 1,
            doc.source().unwrap_or("unknown"),
            doc.relevance_score
        ));
        content.push_str(&truncate_chars(&doc.content, DOCUMENT_TRUNCATE_CHARS));
        content.push_str("\n\n");
    }
    content
}

/// 按worker id标注各worker的结果
pub fn format_worker_findings(reports: &[WorkerReport]) -> String {
    if reports.is_empty() {
        return "(no specialist produced a result)\n".to_string();
    }

    let mut content = String::new();
    for report in reports {
        match (&report.content, &report.error) {
            (Some(text), _) if report.is_completed() => {
                content.push_str(&format!("### [{}]\n{}\n\n", report.worker_id, text.trim()));
            }
            (_, error) => {
                content.push_str(&format!(
                    "### [{}] (failed)\n{}\n\n",
                    report.worker_id,
                    error.as_deref().unwrap_or("no result")
                ));
            }
        }
    }
    content
}

fn current_date() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...(truncated)", &text[..end]),
        None => text.to_string(),
    }
}
