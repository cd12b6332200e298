use anyhow::Context;
use clap::{Parser, Subcommand};
use medqna_rag::{
    api::{create_router, AppState},
    config::RagConfig,
    PipelineConfig, RagPipeline,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, error};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "medqna", version, about = "Answer medical questions from a pre-built document index")]
struct Cli {
    /// TOML configuration file; MEDQNA__SECTION__KEY variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question
    Ask {
        question: String,
        /// Also print the retrieved context
        #[arg(long)]
        show_context: bool,
    },
    /// Print the context that would be sent for a question
    Context { question: String },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = RagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Ask { question, show_context } => {
            let pipeline = build_pipeline(&config).await?;
            let answer = or_exit(pipeline.answer(&question).await);
            println!("{}", answer);
            if show_context {
                let context = or_exit(pipeline.preview_context(&question).await);
                println!("\nRetrieved Contexts\n\n{}", context);
            }
        }
        Command::Context { question } => {
            let pipeline = build_pipeline(&config).await?;
            println!("{}", or_exit(pipeline.preview_context(&question).await));
        }
        Command::Serve { host, port } => {
            let pipeline = Arc::new(build_pipeline(&config).await?);
            let app = create_router(AppState { pipeline });

            let addr = format!(
                "{}:{}",
                host.unwrap_or(config.server.host.clone()),
                port.unwrap_or(config.server.port)
            );
            let listener = TcpListener::bind(&addr).await?;

            info!("medqna server listening on {}", addr);
            info!("Answer endpoint: http://{}/answer", addr);

            if let Err(e) = axum::serve(listener, app).await {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Pipeline failures end the command with the user-facing message on stderr and a non-zero exit.
fn or_exit<T>(result: medqna_rag::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    }
}

async fn build_pipeline(config: &RagConfig) -> anyhow::Result<RagPipeline> {
    let pipeline_config = PipelineConfig::from_rag_config(config)
        .await
        .context("failed to initialize pipeline components")?;
    Ok(RagPipeline::new(pipeline_config))
}
