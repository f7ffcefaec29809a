use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mcp_github_ops::config::{CommentPolicy, GatewayConfig, TenantMode, DEFAULT_BASE_URL};
use mcp_github_ops::credentials::{CredentialFragment, CredentialResolver};
use mcp_github_ops::server;
use mcp_github_ops::transport::Gateway;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

/// MCP server that lets agents create and manage GitHub repositories, issues, and pull requests
#[derive(Parser)]
#[command(name = "mcp-github-ops", version, about)]
struct Cli {
    /// GitHub API base URL
    #[arg(long, env = "GITHUB_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Personal access token used when a call carries none
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitHub username owning the managed repositories
    #[arg(long, env = "GITHUB_USERNAME")]
    username: Option<String>,

    /// Where credentials come from: only the configured identity, or per call with fallback
    #[arg(long, env = "MCP_GITHUB_MODE", value_enum, default_value_t = TenantMode::MultiTenant)]
    mode: TenantMode,

    /// Timeout for each HTTP request, in seconds
    #[arg(long, env = "GITHUB_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Whether issue_update still posts its comment after the field update failed
    #[arg(long, env = "MCP_GITHUB_COMMENT_POLICY", value_enum, default_value_t = CommentPolicy::Independent)]
    comment_policy: CommentPolicy,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // stdout carries the MCP protocol, so logs never go there.
    match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = GatewayConfig::new(cli.base_url, Duration::from_secs(cli.timeout_secs));
    let configured = CredentialFragment::new(cli.token, cli.username);

    if configured.token.is_none() {
        match cli.mode {
            TenantMode::SingleTenant => {
                tracing::warn!("No GitHub token configured, every tool call will fail")
            }
            TenantMode::MultiTenant => {
                tracing::info!("No fallback GitHub token configured, calls must supply their own")
            }
        }
    }

    tracing::info!(
        base_url = %config.base_url,
        mode = ?cli.mode,
        token_configured = configured.token.is_some(),
        username = configured.username.as_deref().unwrap_or("none"),
        comment_policy = ?cli.comment_policy,
        "Starting mcp-github-ops server"
    );

    let resolver = CredentialResolver::for_mode(cli.mode, configured);
    let service = server::McpGithubServer::new(Gateway::new(config), resolver, cli.comment_policy);
    let running = service.serve(stdio()).await?;
    running.waiting().await?;

    Ok(())
}
