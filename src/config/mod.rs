use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agents::specialization::Specialization;
use crate::i18n::TargetLanguage;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "ragagent.toml";

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// LLM模型配置
    pub llm: LLMConfig,

    /// 知识库配置
    pub knowledge: KnowledgeConfig,

    /// 多agent编排配置
    pub agents: AgentsConfig,

    /// 回答语言
    pub target_language: TargetLanguage,

    /// 是否启用详细日志
    pub verbose: bool,

    /// 日志过滤规则，RUST_LOG优先
    pub log_filter: String,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 用于worker与汇总的模型
    pub model: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
}

/// 知识库配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// 预置文档的JSON文件
    pub documents_path: Option<PathBuf>,

    /// 每次检索返回的最大文档数
    pub retrieval_limit: usize,
}

/// 单个worker的配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkerConfig {
    pub id: String,
    pub specialization: Specialization,
}

impl WorkerConfig {
    pub fn new(id: impl Into<String>, specialization: Specialization) -> Self {
        Self {
            id: id.into(),
            specialization,
        }
    }
}

/// 多agent编排配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AgentsConfig {
    /// 是否启用worker分解；关闭时走单agent路径
    pub use_workers: bool,

    /// worker名册
    pub workers: Vec<WorkerConfig>,

    /// 单个任务超时（秒），不设置则不限制
    pub task_timeout_seconds: Option<u64>,

    /// 覆盖默认的基础人设提示词
    pub persona: Option<String>,
}

impl AgentsConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_seconds.map(Duration::from_secs)
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// 校验worker名册与检索参数
    pub fn validate(&self) -> Result<()> {
        if self.knowledge.retrieval_limit == 0 {
            bail!("knowledge.retrieval_limit must be greater than 0");
        }

        let mut seen = HashSet::new();
        for worker in &self.agents.workers {
            if worker.id.trim().is_empty() {
                bail!("worker id must not be empty");
            }
            if !seen.insert(worker.id.as_str()) {
                bail!("duplicate worker id in config: {}", worker.id);
            }
        }
        Ok(())
    }

    /// 当前目录下的默认配置文件
    pub fn default_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LLMConfig::default(),
            knowledge: KnowledgeConfig::default(),
            agents: AgentsConfig::default(),
            target_language: TargetLanguage::default(),
            verbose: false,
            log_filter: String::from("info"),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("RAGAGENT_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api.openai.com/v1"),
            model: String::from("gpt-4o-mini"),
            max_tokens: 4096,
            temperature: 0.2,
            retry_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            documents_path: None,
            retrieval_limit: 5,
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            use_workers: true,
            workers: vec![
                WorkerConfig::new("retrieval", Specialization::Retrieval),
                WorkerConfig::new("analysis", Specialization::Analysis),
                WorkerConfig::new("draft", Specialization::Draft),
            ],
            task_timeout_seconds: None,
            persona: None,
        }
    }
}
