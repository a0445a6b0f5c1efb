use anyhow::Result;
use clap::Parser;
use ragagent_rs::cli::Args;
use ragagent_rs::session::launch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let options = args.session_options();
    let config = args.into_config()?;

    init_tracing(&config.log_filter)?;

    launch(&config, &options).await
}

/// RUST_LOG优先，否则使用配置中的过滤规则
fn init_tracing(log_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
