use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use voice_relay::{
    RelayConfig,
    dialer::TwilioDialer,
    routes,
    state::AppState,
    store::{CallStore, SupabaseCallStore},
};

/// Voice Relay - Real-time phone conversations with a language model
#[derive(Parser, Debug)]
#[command(name = "voice-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the carrier webhook and media-stream endpoints
    Serve,

    /// Place an outbound call and register what the assistant should do on it
    Dial {
        /// Number to call, E.164 format
        #[arg(long)]
        to: String,

        /// Task description handed to the assistant
        #[arg(short = 'd', long)]
        description: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!(path = %config_path.display(), "Loading configuration file");
        RelayConfig::from_file(&config_path)?
    } else {
        RelayConfig::from_env()?
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Dial { to, description } => dial(config, &to, &description).await,
    }
}

async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let address = config.address();
    let app_state = AppState::new(config)?;
    let app = routes::create_router(app_state);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    info!("Server listening on http://{}", socket_addr);
    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn dial(config: RelayConfig, to: &str, description: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let twiml_url = config.twiml_url()?;
    let dialer = TwilioDialer::new(config.twilio_config()?, client.clone())?;

    let (Some(url), Some(service_role)) = (&config.supabase_url, &config.supabase_service_role)
    else {
        anyhow::bail!("SUPABASE_URL and SUPABASE_SERVICE_ROLE are required to dial");
    };
    let store = SupabaseCallStore::new(url, service_role, client)?;

    let call_sid = dialer.place_call(to, &twiml_url).await?;
    store.register(&call_sid, description).await?;

    println!("{call_sid}");
    Ok(())
}
