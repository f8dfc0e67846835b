mod application;
mod config;
mod domain;
mod infrastructure;

use application::agent::ReviewAgent;
use application::tooling::{HostConfig, HostProcess};
use clap::{Parser, ValueEnum};
use config::{HostSettings, OrchestratorSettings};
use infrastructure::host::gitlab::GitLabClient;
use infrastructure::host::guidelines::KnowledgeBase;
use infrastructure::host::jira::JiraClient;
use infrastructure::host::registry::ToolRegistry;
use infrastructure::model::OpenRouterClient;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "mr-reviewer",
    version,
    about = "Autonomous merge-request review agent"
)]
struct Cli {
    /// GitLab project ID (numeric or namespaced path).
    project_id: Option<String>,
    /// Merge request IID within the project.
    mr_iid: Option<String>,
    #[arg(long, value_enum, default_value_t = RunMode::Review)]
    mode: RunMode,
    /// Override the review rules directory (host mode).
    #[arg(long)]
    rules_dir: Option<PathBuf>,
    /// Override the tool host executable (defaults to this binary).
    #[arg(long)]
    host_command: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunMode {
    /// Drive a review session against one merge request.
    Review,
    /// Serve the tool registry over stdio (spawned by review mode).
    Host,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    debug!(?cli.mode, "CLI arguments parsed");

    match cli.mode {
        RunMode::Host => run_host(cli).await,
        RunMode::Review => run_review(cli).await,
    }
}

async fn run_host(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut settings = HostSettings::from_env()?;
    if let Some(rules_dir) = cli.rules_dir {
        settings.rules_dir = rules_dir;
    }
    info!(rules_dir = %settings.rules_dir.display(), "Starting tool host");

    let registry = ToolRegistry::new(
        Arc::new(GitLabClient::new(settings.gitlab)),
        Arc::new(JiraClient::new(settings.jira)),
        KnowledgeBase::new(settings.rules_dir),
    );
    infrastructure::host::serve(registry).await?;
    Ok(())
}

async fn run_review(cli: Cli) -> Result<(), Box<dyn Error>> {
    let (Some(project_id), Some(mr_iid)) = (cli.project_id.clone(), cli.mr_iid.clone()) else {
        println!("Usage: mr-reviewer <project-id> <mr-iid>");
        return Ok(());
    };

    let settings = OrchestratorSettings::from_env()?;
    let provider = OpenRouterClient::new(settings.base_url.clone(), settings.api_key.clone());

    let command = match cli.host_command {
        Some(command) => command,
        None => std::env::current_exe()?.display().to_string(),
    };
    let transport = Arc::new(HostProcess::new(HostConfig {
        command,
        args: vec!["--mode".into(), "host".into()],
    }));

    info!(project_id, mr_iid, model = settings.model, "Starting review");
    let agent = ReviewAgent::new(provider, transport, settings.model);
    let outcome = match agent.run(&project_id, &mr_iid).await {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("{}", err.user_message());
            return Err(err.into());
        }
    };

    info!(steps = outcome.steps.len(), "Review completed");
    println!("{}", outcome.response);
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Host mode's stdout carries protocol frames; all logging goes to
        // stderr in both modes.
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
