//! 会话运行：单次问答或交互式循环

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agents::{Coordinator, RagAgent};
use crate::config::Config;
use crate::llm::LLMClient;
use crate::types::WorkerReport;

/// 本次运行的模式选项，不属于配置文件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOptions {
    /// 只回答这一个问题后退出
    pub query: Option<String>,
    /// 使用单agent检索问答
    pub single_agent: bool,
    /// 回答后打印各worker的结果
    pub show_workers: bool,
}

/// 交互循环中的一行输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Workers,
    Clear,
    Empty,
    Ask(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => ReplCommand::Empty,
            "exit" | "quit" => ReplCommand::Exit,
            "/workers" => ReplCommand::Workers,
            "/clear" => ReplCommand::Clear,
            _ => ReplCommand::Ask(line.to_string()),
        }
    }
}

/// 回答问题的一方：多agent编排或单agent问答
pub enum Responder {
    MultiAgent(Box<Coordinator>),
    SingleAgent(RagAgent),
}

impl Responder {
    pub async fn respond(&mut self, text: &str, cancel: &CancellationToken) -> String {
        match self {
            Responder::MultiAgent(coordinator) => coordinator.process_with_cancel(text, cancel).await,
            Responder::SingleAgent(agent) => agent.process_message_with_cancel(text, cancel).await,
        }
    }

    pub fn clear_history(&mut self) {
        match self {
            Responder::MultiAgent(coordinator) => coordinator.controller_mut().clear_history(),
            Responder::SingleAgent(agent) => agent.clear_history(),
        }
    }

    /// 单agent模式没有worker结果
    pub fn worker_results(&self) -> Option<BTreeMap<String, WorkerReport>> {
        match self {
            Responder::MultiAgent(coordinator) => Some(coordinator.get_worker_results()),
            Responder::SingleAgent(_) => None,
        }
    }
}

/// 会话级的中断状态：有请求在途时Ctrl-C取消该请求，空闲时结束会话
#[derive(Clone, Default)]
pub struct Interrupts {
    in_flight: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
}

impl Interrupts {
    /// 为新请求登记取消令牌
    pub async fn begin_request(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        *self.in_flight.lock().await = Some(cancel.clone());
        cancel
    }

    pub async fn end_request(&self) {
        self.in_flight.lock().await.take();
    }

    /// 处理一次中断；取消了在途请求时返回true
    pub async fn interrupt(&self) -> bool {
        match self.in_flight.lock().await.take() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => {
                self.shutdown.cancel();
                false
            }
        }
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// 整个会话只安装一次的Ctrl-C监听
    pub fn listen(&self) -> JoinHandle<()> {
        let interrupts = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if interrupts.interrupt().await {
                    println!("\n⛔ 已取消当前请求");
                } else {
                    break;
                }
            }
        })
    }
}

/// 启动会话
pub async fn launch(config: &Config, options: &SessionOptions) -> Result<()> {
    // 启动时检查模型连接
    LLMClient::new(config.llm.clone())?
        .check_connection()
        .await?;

    let coordinator = Coordinator::from_config(config).await?;
    let mut responder = if options.single_agent {
        println!("🤖 单agent模式");
        Responder::SingleAgent(coordinator.single_agent())
    } else {
        println!("🤖 多agent模式，workers: {}", coordinator.worker_ids().join(", "));
        Responder::MultiAgent(Box::new(coordinator))
    };

    let interrupts = Interrupts::default();
    let listener = interrupts.listen();

    let result = match &options.query {
        Some(query) => answer(&mut responder, &interrupts, query, options.show_workers).await,
        None => run_repl(&mut responder, &interrupts, options.show_workers).await,
    };
    listener.abort();
    result
}

/// 交互式循环，读取stdin直到exit/quit、EOF或空闲时的Ctrl-C
pub async fn run_repl(
    responder: &mut Responder,
    interrupts: &Interrupts,
    show_workers: bool,
) -> Result<()> {
    println!("💬 输入问题开始对话，/workers 查看worker结果，/clear 清空历史，exit 退出");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            _ = interrupts.shutdown_token().cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        match ReplCommand::parse(&line) {
            ReplCommand::Exit => break,
            ReplCommand::Empty => continue,
            ReplCommand::Clear => {
                responder.clear_history();
                println!("🧹 对话历史已清空");
            }
            ReplCommand::Workers => print_worker_results(responder)?,
            ReplCommand::Ask(text) => answer(responder, interrupts, &text, show_workers).await?,
        }
    }

    println!("👋 再见");
    Ok(())
}

async fn answer(
    responder: &mut Responder,
    interrupts: &Interrupts,
    text: &str,
    show_workers: bool,
) -> Result<()> {
    let cancel = interrupts.begin_request().await;
    let reply = responder.respond(text, &cancel).await;
    interrupts.end_request().await;

    println!("\n{}", reply);
    if show_workers {
        print_worker_results(responder)?;
    }
    Ok(())
}

fn print_worker_results(responder: &Responder) -> Result<()> {
    match responder.worker_results() {
        Some(results) if !results.is_empty() => {
            println!("\n📋 worker结果:");
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Some(_) => println!("📋 暂无worker结果"),
        None => println!("📋 单agent模式下没有worker结果"),
    }
    Ok(())
}
