use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cli::error::{read_password, user_error};
use crate::cli::output::{format_mapping_table, format_session, is_tty, session_json};
use crate::config::{paths, Config};
use crate::controller::{ControllerOptions, TrackingController};
use crate::device::{LineTransport, OrientationStream, StreamOptions, Transport};
use crate::error::{BridgeError, ConnectionError};
use crate::models::Session;
use crate::remote::HackaruApi;
use crate::repo::{CredentialStore, FileCredentialStore};
use crate::session::{SessionApi, SessionClient};

#[derive(Parser)]
#[command(name = "cubetrack")]
#[command(about = "Cube to Hackaru bridge - track time by turning a Timeular cube")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file (default: ~/.cubetrack/config.yml)
    #[arg(long, global = true, env = "CUBETRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the cube and track time until interrupted (default)
    Run {
        /// Read face numbers from stdin instead of Bluetooth
        #[arg(long)]
        stdin: bool,
    },
    /// Log in to Hackaru and store the credential
    Login,
    /// Forget the stored credential
    Logout,
    /// Show the face mapping and the activity running remotely
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Stop the activity running remotely, if any
    Stop,
    /// Validate the config file and print the face mapping
    Check,
}

/// Parse arguments and dispatch
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run { stdin: false });
    init_logging(cli.verbose, matches!(command, Commands::Run { .. }));

    let config_path = paths::resolve_config_path(cli.config.as_deref())?;
    let config = Config::load(&config_path)?;

    match command {
        Commands::Check => handle_check(&config, &config_path),
        Commands::Logout => handle_logout(&config),
        Commands::Login => block_on(handle_login(&config)),
        Commands::Status { json } => block_on(handle_status(&config, json)),
        Commands::Stop => block_on(handle_stop(&config)),
        Commands::Run { stdin } => block_on(handle_run(&config, stdin)),
    }
}

fn init_logging(verbose: u8, long_running: bool) {
    let level = match verbose {
        0 if long_running => "info",
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init();
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(future)
}

fn session_client(config: &Config, cancel: CancellationToken) -> Result<SessionClient<HackaruApi>> {
    let api = HackaruApi::new(&config.endpoint, config.request_timeout)?;
    let store = FileCredentialStore::new(&config.credential_path);
    Ok(SessionClient::new(api, Box::new(store), config.retry, cancel).with_mapping(config.mapping.clone()))
}

/// Resume a stored credential without prompting; used by one-shot commands
async fn resume_stored(client: &mut SessionClient<HackaruApi>, config: &Config) -> Result<()> {
    let store = FileCredentialStore::new(&config.credential_path);
    let Some(credential) = store.load()?.or_else(|| config.seed_credential.clone()) else {
        user_error("Not logged in. Run `cubetrack login` first.");
    };
    client
        .resume(credential)
        .await
        .context("Failed to validate stored credential")?;
    Ok(())
}

/// Handle `check`
fn handle_check(config: &Config, config_path: &std::path::Path) -> Result<()> {
    println!("Config OK: {}", config_path.display());
    println!("Cube: {}", config.address);
    println!("Endpoint: {}", config.endpoint);
    println!();
    print!("{}", format_mapping_table(&config.mapping, is_tty()));
    let unused: Vec<&str> = config
        .tasks
        .values()
        .filter(|task| !config.mapping.iter().any(|(_, t)| t.name == task.name))
        .map(|task| task.name.as_str())
        .collect();
    if !unused.is_empty() {
        println!("\nTasks without a face: {}", unused.join(", "));
    }
    Ok(())
}

/// Handle `logout`
fn handle_logout(config: &Config) -> Result<()> {
    FileCredentialStore::new(&config.credential_path)
        .clear()
        .context("Failed to remove stored credential")?;
    println!("Stored credential removed.");
    Ok(())
}

/// Handle `login`
async fn handle_login(config: &Config) -> Result<()> {
    let mut client = session_client(config, CancellationToken::new())?;
    let password = read_password(&config.email, true)?;
    client.login(&config.email, &password).await?;
    println!("Logged in as {}.", config.email);
    Ok(())
}

/// Handle `status [--json]`
async fn handle_status(config: &Config, json: bool) -> Result<()> {
    let mut client = session_client(config, CancellationToken::new())?;
    resume_stored(&mut client, config).await?;
    let now = Utc::now();

    if json {
        let mut value = session_json(client.session(), now);
        value["faces"] = config
            .mapping
            .iter()
            .map(|(face, task)| (face.value().to_string(), serde_json::json!(task.name)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", format_mapping_table(&config.mapping, is_tty()));
        println!();
        println!("{}", format_session(client.session(), now));
    }
    Ok(())
}

/// Handle `stop`
async fn handle_stop(config: &Config) -> Result<()> {
    let mut client = session_client(config, CancellationToken::new())?;
    resume_stored(&mut client, config).await?;

    let Session::Running { task, .. } = client.session().clone() else {
        println!("No activity running.");
        return Ok(());
    };
    client.stop_activity().await.context("Failed to stop activity")?;
    println!("Stopped {}.", task);
    Ok(())
}

#[cfg(feature = "ble")]
async fn bluetooth_transport() -> Result<Arc<dyn Transport>, ConnectionError> {
    Ok(Arc::new(crate::device::ble::BleTransport::new().await?))
}

#[cfg(not(feature = "ble"))]
async fn bluetooth_transport() -> Result<Arc<dyn Transport>, ConnectionError> {
    Err(ConnectionError::new(
        "built without Bluetooth support; rebuild with `--features ble` or use `run --stdin`",
    ))
}

/// Handle `run [--stdin]`
async fn handle_run(config: &Config, stdin: bool) -> Result<()> {
    let cancel = CancellationToken::new();

    let email = config.email.clone();
    let mut client = session_client(config, cancel.clone())?
        .with_relogin(config.email.clone(), Box::new(move || read_password(&email, false)));
    client
        .authenticate(&config.email, config.seed_credential.clone(), || {
            read_password(&config.email, !stdin)
        })
        .await
        .context("Failed to authenticate with Hackaru")?;

    let transport: Arc<dyn Transport> = if stdin {
        Arc::new(LineTransport::stdin())
    } else {
        bluetooth_transport().await.map_err(BridgeError::from)?
    };

    let options = StreamOptions {
        debounce: config.debounce,
        ..StreamOptions::default()
    };
    let stream = OrientationStream::connect(transport, &config.address, options, cancel.clone())
        .await
        .map_err(BridgeError::from)
        .with_context(|| format!("Failed to connect to cube {}", config.address))?;

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            interrupt.cancel();
        }
    });

    let mut controller = TrackingController::new(
        client,
        config.mapping.clone(),
        ControllerOptions {
            reconcile_interval: config.reconcile_interval,
            shutdown_timeout: config.shutdown_timeout,
        },
    );
    info!("Tracking {} faces; turn the cube to start", config.mapping.len());
    controller.run(stream.events, cancel.clone()).await;

    cancel.cancel();
    match stream.worker.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!("Orientation stream failed: {}", e);
            Err(BridgeError::from(e)).context("Lost the cube and could not reconnect")
        }
        Err(e) => Err(anyhow::anyhow!("Orientation stream task failed: {}", e)),
    }
}
