use crate::config::{Config, LLMProvider};
use crate::i18n::TargetLanguage;
use crate::session::SessionOptions;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// RagAgent-RS - 基于知识库的多agent问答编排引擎
#[derive(Parser, Debug)]
#[command(name = "ragagent")]
#[command(
    about = "Multi-agent retrieval augmented question answering: decomposes a request into specialist tasks, runs them in parallel and synthesizes one grounded answer."
)]
#[command(version)]
pub struct Args {
    /// 只回答这个问题后退出；不提供时进入交互模式
    #[arg(short, long)]
    pub query: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 预置文档的JSON文件
    #[arg(short, long)]
    pub documents: Option<PathBuf>,

    /// 使用单agent检索问答
    #[arg(long)]
    pub single_agent: bool,

    /// 关闭worker分解，Controller走单agent路径
    #[arg(long)]
    pub no_workers: bool,

    /// 回答后打印各worker的结果
    #[arg(long)]
    pub show_workers: bool,

    /// 每次检索返回的最大文档数
    #[arg(long)]
    pub retrieval_limit: Option<usize>,

    /// 单个任务超时（秒）
    #[arg(long)]
    pub task_timeout: Option<u64>,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 使用的模型
    #[arg(long)]
    pub model: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// 回答语言 (auto, zh, en, ja, de, fr)
    #[arg(long)]
    pub target_language: Option<String>,
}

impl Args {
    /// 本次运行的模式选项
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            query: self.query.clone(),
            single_agent: self.single_agent,
            show_workers: self.show_workers,
        }
    }

    /// 将CLI参数转换为配置
    pub fn into_config(self) -> Result<Config> {
        let mut config = if let Some(config_path) = &self.config {
            // 显式指定的配置文件必须可读
            Config::from_file(config_path)
                .with_context(|| format!("无法读取配置文件 {:?}", config_path))?
        } else {
            let default_config_path = Config::default_path();
            if default_config_path.exists() {
                Config::from_file(&default_config_path).with_context(|| {
                    format!("无法读取默认配置文件 {:?}", default_config_path)
                })?
            } else {
                Config::default()
            }
        };

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            if let Ok(provider) = provider_str.parse::<LLMProvider>() {
                config.llm.provider = provider;
            } else {
                eprintln!(
                    "⚠️ 警告: 未知的provider: {}，使用 {}",
                    provider_str, config.llm.provider
                );
            }
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        // 目标语言配置
        if let Some(target_language_str) = self.target_language {
            if let Ok(target_language) = target_language_str.parse::<TargetLanguage>() {
                config.target_language = target_language;
            } else {
                eprintln!(
                    "⚠️ 警告: 未知的目标语言: {}，使用 {}",
                    target_language_str, config.target_language
                );
            }
        }

        // 知识库与编排配置
        if let Some(documents) = self.documents {
            config.knowledge.documents_path = Some(documents);
        }
        if let Some(retrieval_limit) = self.retrieval_limit {
            config.knowledge.retrieval_limit = retrieval_limit;
        }
        if self.no_workers {
            config.agents.use_workers = false;
        }
        if let Some(task_timeout) = self.task_timeout {
            config.agents.task_timeout_seconds = Some(task_timeout);
        }

        if self.verbose {
            config.verbose = true;
            config.log_filter = "debug".to_string();
        }

        config.validate()?;
        Ok(config)
    }
}

// Include tests
#[cfg(test)]
mod tests;
