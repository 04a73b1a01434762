use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use presenced::config::Config;
use presenced::credentials;
use presenced::gateway::heartbeat::LivenessPolicy;
use presenced::gateway::{Session, SessionOptions};
use presenced::settings::SettingsStore;

#[derive(Parser)]
#[command(name = "presenced", version, about = "Keeps an account online on the gateway")]
struct Cli {
    /// Settings file (status, custom status, voice channel)
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Gateway WebSocket URL
    #[arg(long)]
    gateway_url: Option<String>,
    /// REST API base URL
    #[arg(long)]
    api_url: Option<String>,
    /// Env file read at startup and updated when a new token is entered
    #[arg(long, default_value = credentials::DEFAULT_ENV_FILE)]
    env_file: PathBuf,
    /// Ignore the stored token and ask for a new one
    #[arg(long)]
    change_token: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::from_path(&cli.env_file).ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presenced=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env();
    if let Some(path) = cli.settings {
        config.settings_path = path;
    }
    if let Some(url) = cli.gateway_url {
        config.gateway_url = url;
    }
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }

    print_banner(&config);

    let settings = match SettingsStore::load(&config.settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("  \x1b[31mfailed to load settings: {e}\x1b[0m");
            return ExitCode::FAILURE;
        }
    };

    // One reader for the whole run so typed-ahead console input is not lost.
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let stored = if cli.change_token {
        None
    } else {
        config.token.clone()
    };
    let (rest, user) =
        match credentials::login(&config.api_url, stored, &cli.env_file, &mut input).await {
            Ok(login) => login,
            Err(e) => {
                eprintln!("  \x1b[31mlogin failed: {e}\x1b[0m");
                return ExitCode::FAILURE;
            }
        };
    eprintln!("  \x1b[32m→ logged in as {}\x1b[0m", user.username);
    eprintln!();

    let session = Session::start(SessionOptions::from(&config), rest, user, settings);

    tokio::select! {
        _ = presenced::console::run(session.clone(), input) => {}
        _ = shutdown_signal() => {}
    }

    session.stop().await;
    ExitCode::SUCCESS
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let liveness = match config.liveness {
        LivenessPolicy::Disabled => "off".to_string(),
        LivenessPolicy::MissedAcks(n) => format!("drop after {n} missed acks"),
    };

    eprintln!();
    eprintln!("  \x1b[1;36mpresenced\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mgateway\x1b[0m      {}", config.gateway_url);
    eprintln!("  \x1b[2mapi\x1b[0m          {}", config.api_url);
    eprintln!("  \x1b[2msettings\x1b[0m     {}", config.settings_path.display());
    eprintln!("  \x1b[2mliveness\x1b[0m     {liveness}");
    eprintln!();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
