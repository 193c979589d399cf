use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use media_sources::MediaKind;
use tracing::{error, info};

use media_fetch::config::AppConfig;
use media_fetch::credentials::{CredentialScope, CredentialStore};
use media_fetch::domain::RequesterId;
use media_fetch::orchestrator::{DownloadRequest, Outcome};
use media_fetch::router::ToggleStore;
use media_fetch::services::ServiceContainer;
use media_fetch::utils::http_client::install_rustls_provider;
use media_fetch::{logging, panic_hook};

#[derive(Parser, Debug)]
#[command(name = "media-fetch", version, about = "Fetch media from supported sources")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download one or more locators for a requester
    Fetch {
        #[arg(long)]
        requester: RequesterId,
        #[arg(long, default_value = "auto")]
        kind: MediaKind,
        #[arg(required = true)]
        locators: Vec<String>,
    },
    /// Enable or disable a source module (e.g. `youtube_audio`)
    Toggle { module: String, state: ToggleState },
    /// Store a cookie file for a source, globally or for one requester
    Credential {
        source: String,
        file: PathBuf,
        #[arg(long)]
        requester: Option<RequesterId>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ToggleState {
    On,
    Off,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    install_rustls_provider();

    let config = AppConfig::from_env_or_default();
    let (logging_config, _guard) = logging::init_logging(&config.log_dir, config.log_json)?;
    panic_hook::install(&config.log_dir);

    let container = ServiceContainer::from_config(config, Some(logging_config)).await?;
    let result = execute(&container, args.command).await;
    container.shutdown().await?;
    result
}

async fn execute(container: &ServiceContainer, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Fetch {
            requester,
            kind,
            locators,
        } => {
            let handles = locators.into_iter().map(|locator| {
                let orchestrator = Arc::clone(&container.orchestrator);
                let request = DownloadRequest::new(requester, locator.clone()).with_kind(kind);
                async move { (locator, orchestrator.handle(request).await) }
            });

            let mut failed = 0;
            for (locator, outcome) in join_all(handles).await {
                match outcome {
                    Outcome::Redelivered { artifact } => {
                        println!("{locator}: redelivered {artifact}");
                    }
                    Outcome::Delivered {
                        artifact,
                        reused_local,
                    } => {
                        let via = if reused_local { " (reused)" } else { "" };
                        println!("{locator}: delivered {artifact}{via}");
                    }
                    Outcome::Failed { user_message, .. } => {
                        failed += 1;
                        println!("{locator}: {user_message}");
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} download(s) failed");
            }
        }
        Commands::Toggle { module, state } => {
            let enabled = matches!(state, ToggleState::On);
            container.toggles.set(&module, enabled).await?;
            info!(module = %module, enabled, "Module toggle updated");
            println!("{module}: {}", if enabled { "enabled" } else { "disabled" });
        }
        Commands::Credential {
            source,
            file,
            requester,
        } => {
            let blob = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let scope = requester.map_or(CredentialScope::Global, CredentialScope::requester);
            container.credentials.set(scope, &source, &blob).await?;
            info!(source = %source, %scope, "Credential stored");
            println!("{source}: credential stored ({scope})");
        }
    }
    Ok(())
}
