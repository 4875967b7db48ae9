use std::path::PathBuf;
use std::time::Duration;

use a3s_preview::{
    AgentContext, ConfigurationSnapshot, HttpBackend, MessageOrigin, MessageRole, PreviewConfig,
    PreviewController, PreviewEvent,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Parser)]
#[command(
    name = "a3s-preview",
    about = "a3s-preview: chat with an agent or preview its configuration from the terminal"
)]
struct Cli {
    /// JSON config file (baseUrl, adminToken, quietPeriodMs, ...)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Numeric agent id
    #[arg(long)]
    agent_id: u64,

    /// Agent public id
    #[arg(long)]
    public_id: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a test message as the operator
    Chat {
        /// Message text
        message: Vec<String>,
    },
    /// Run one debounced preview round for a configuration snapshot
    Preview {
        /// Snapshot JSON file (persona, documentIds, webSearch, ...)
        snapshot: PathBuf,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .without_time()
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("[a3s-preview] {e:#}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PreviewConfig> {
    let mut config = match &cli.config {
        Some(path) => PreviewConfig::from_file(path)?,
        None => PreviewConfig::default(),
    };
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url.clone());
    }
    if config.admin_token.is_none() {
        if let Ok(token) = std::env::var("A3S_ADMIN_TOKEN") {
            config = config.with_admin_token(token);
        }
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let backend = HttpBackend::new(&config)?;
    let controller = PreviewController::new(config, backend);
    controller.set_agent(Some(AgentContext::new(cli.agent_id, cli.public_id.clone())));

    match cli.command {
        Commands::Chat { message } => {
            let reply = controller.send_message(&message.join(" ")).await?;
            println!("{}", reply.content);
        }
        Commands::Preview {
            snapshot: path,
            timeout_secs,
        } => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            let snapshot: ConfigurationSnapshot = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

            let mut events = controller.subscribe();
            controller.configuration_changed(snapshot)?;

            tokio::time::timeout(Duration::from_secs(timeout_secs), wait_for_outcome(&mut events))
                .await
                .context("Timed out waiting for the preview")??;

            for message in controller.messages() {
                let who = match (message.origin, message.role) {
                    (MessageOrigin::Preview, MessageRole::User) => "preview prompt",
                    (_, MessageRole::User) => "you",
                    (_, MessageRole::Assistant) => "agent",
                };
                println!("[{}] {}", who, message.content);
            }
        }
    }

    Ok(())
}

/// Wait for the preview round to settle or fail
///
/// Lagging behind the event channel only skips intermediate events.
async fn wait_for_outcome(events: &mut broadcast::Receiver<PreviewEvent>) -> anyhow::Result<()> {
    loop {
        match events.recv().await {
            Ok(PreviewEvent::Settled { .. }) => return Ok(()),
            Ok(PreviewEvent::Failed { error, .. }) => {
                return Err(anyhow::anyhow!("Preview failed: {}", error))
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Preview events lagged");
                continue;
            }
            Err(RecvError::Closed) => return Err(anyhow::anyhow!("Event stream closed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed(n: usize) -> PreviewEvent {
        PreviewEvent::Armed {
            fingerprint: format!("fp-{}", n),
        }
    }

    #[tokio::test]
    async fn test_wait_survives_lagged_receiver() {
        let (tx, mut rx) = broadcast::channel(2);
        for n in 0..10 {
            tx.send(armed(n)).unwrap();
        }
        tx.send(PreviewEvent::Settled {
            fingerprint: "fp-9".to_string(),
        })
        .unwrap();

        assert!(wait_for_outcome(&mut rx).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_reports_failure() {
        let (tx, mut rx) = broadcast::channel(4);
        tx.send(PreviewEvent::Failed {
            fingerprint: "fp".to_string(),
            error: "Chat request failed: 502".to_string(),
        })
        .unwrap();

        let err = wait_for_outcome(&mut rx).await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_wait_stops_when_channel_closes() {
        let (tx, mut rx) = broadcast::channel::<PreviewEvent>(4);
        tx.send(armed(0)).unwrap();
        drop(tx);

        let err = wait_for_outcome(&mut rx).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
