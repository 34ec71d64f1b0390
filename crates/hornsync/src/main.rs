use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use hornsync::api;
use hornsync::api::AppState;
use hornsync::channel::list_ports;
use hornsync::channel::SerialConnector;
use hornsync::logging;
use hornsync::monitor;
use hornsync::probe;
use hornsync::report::render_status;
use hornsync::report::render_twin;
use hornsync::store;
use hornsync::StoreError;
use hornsync::Synchronizer;
use hornsync::TwinDocument;
use hornsync_config::format_diagnostics;
use hornsync_config::Config;

const DEFAULT_CONFIG: &str = "hornsync.toml";

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file. Defaults to ./hornsync.toml when it exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the synchronizer and the HTTP API
    Serve,
    /// Insert a twin document from a JSON file, replacing any existing one
    Seed { file: PathBuf },
    /// Print a twin document
    Show { thing_id: Option<String> },
    /// Watch a twin for horn activity
    Monitor {
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
    },
    /// List serial ports
    Ports,
    /// Validate the configuration file
    CheckConfig,
    /// Check connectivity to the store, MQTT broker and Ditto
    Probe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, source) = load_config(cli.config.as_deref())?;
    logging::init(&config.logging);

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Seed { file } => seed(&config, &file).await,
        Command::Show { thing_id } => {
            let thing_id = thing_id.unwrap_or_else(|| config.twin.thing_id.clone());
            show(&config, &thing_id).await
        }
        Command::Monitor { interval_ms } => {
            watch(&config, Duration::from_millis(interval_ms)).await
        }
        Command::Ports => ports(),
        Command::CheckConfig => {
            match source {
                Some(path) => println!("{}: configuration is valid", path.display()),
                None => println!("No configuration file found; using defaults"),
            }
            Ok(())
        }
        Command::Probe => {
            let store = store::open(&config.twin.store).await?;
            let report = probe::run_all(&config.probes, store).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_ok() {
                anyhow::bail!("one or more probes failed");
            }
            Ok(())
        }
    }
}

/// Loads `path`, or `hornsync.toml` if present, or the defaults. Diagnostics
/// are printed to stderr.
fn load_config(path: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => return Ok((Config::default(), None)),
    };

    match Config::from_file(&path) {
        Ok((config, diagnostics)) => {
            if !diagnostics.is_empty() {
                eprint!("{}", format_diagnostics(&diagnostics.0));
            }
            Ok((config, Some(path)))
        }
        Err(diagnostics) => {
            eprint!("{}", format_diagnostics(&diagnostics.0));
            anyhow::bail!("failed to load configuration from {}", path.display())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("hornsync starting");

    let store = store::open(&config.twin.store)
        .await
        .context("failed to open twin store")?;
    let connector = Arc::new(SerialConnector::new(&config.serial));
    let sync = Arc::new(Synchronizer::new(
        config.twin.thing_id.clone(),
        store.clone(),
        connector,
        &config.sync,
    ));

    if config.sync.auto_connect {
        let outcome = sync.connect().await;
        tracing::info!("Initial connect: {}", outcome);
        if config.sync.auto_sync && sync.is_connected().await {
            if let Err(e) = sync.enable_auto_sync().await {
                tracing::warn!("Could not enable auto-sync: {}", e);
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let state = AppState::new(store, sync.clone());
    let listen = config.api.listen.clone();
    let port = config.api.port;
    let mut server =
        tokio::spawn(async move { api::serve(&listen, port, state, shutdown_rx).await });

    tracing::info!("Press Ctrl+C to exit");
    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
            let _ = shutdown_tx.send(());
            server.await
        }
        result = &mut server => result,
    };

    sync.shutdown().await;
    result.context("HTTP API task panicked")??;

    tracing::info!("hornsync shutdown complete");
    Ok(())
}

async fn seed(config: &Config, file: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    let doc = TwinDocument::from_value(value)?;

    let store = store::open(&config.twin.store).await?;
    if store.kind() == "memory" {
        tracing::warn!("Seeding the memory store; the document is discarded on exit");
    }

    let thing_id = doc.thing_id().to_string();
    let doc = match store.insert(doc.clone()).await {
        Ok(doc) => {
            println!("Inserted {}", thing_id);
            doc
        }
        Err(StoreError::AlreadyExists(_)) => {
            let doc = store.replace(&thing_id, doc).await?;
            println!("Replaced {} (revision {})", thing_id, doc.revision());
            doc
        }
        Err(e) => return Err(e.into()),
    };
    println!("{}", render_status(&doc.horn_status()));
    Ok(())
}

async fn show(config: &Config, thing_id: &str) -> anyhow::Result<()> {
    let store = store::open(&config.twin.store).await?;
    let doc = store
        .get(thing_id)
        .await?
        .with_context(|| format!("thing '{}' not found in {} store", thing_id, store.kind()))?;
    print!("{}", render_twin(&doc));
    Ok(())
}

async fn watch(config: &Config, interval: Duration) -> anyhow::Result<()> {
    let store = store::open(&config.twin.store).await?;
    let thing_id = config.twin.thing_id.clone();
    println!(
        "Monitoring {} every {:?}; press Ctrl+C to stop",
        thing_id, interval
    );

    let report = |event: monitor::WatchEvent| {
        println!("[{}] {}", chrono::Utc::now().format("%H:%M:%S"), event);
    };
    tokio::select! {
        result = monitor::run(store, thing_id, interval, report) => result?,
        signal = tokio::signal::ctrl_c() => signal?,
    }
    println!("Monitor stopped");
    Ok(())
}

fn ports() -> anyhow::Result<()> {
    let ports = list_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{:<24}{}", port.name, port.description);
    }
    Ok(())
}
