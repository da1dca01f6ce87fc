//! slatekv server entry point.
//!
//! Wires the pieces together: parse flags, load the snapshot, start the
//! sweeper, accept connections, and on Ctrl+C stop the sweeper and write a
//! final snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use slatekv::commands::CommandHandler;
use slatekv::connection::serve_connection;
use slatekv::storage::{Sweeper, TypedStore, DEFAULT_SWEEP_INTERVAL};

/// Server configuration.
struct Config {
    host: String,
    port: u16,
    snapshot: PathBuf,
    sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: slatekv::DEFAULT_HOST.to_string(),
            port: slatekv::DEFAULT_PORT,
            snapshot: PathBuf::from(slatekv::DEFAULT_SNAPSHOT_FILE),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl Config {
    /// Parses configuration from command-line arguments.
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = take_value(&args, &mut i, "--host");
                }
                "--port" | "-p" => {
                    config.port = take_value(&args, &mut i, "--port")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                }
                "--snapshot" | "-s" => {
                    config.snapshot = PathBuf::from(take_value(&args, &mut i, "--snapshot"));
                }
                "--sweep-interval" => {
                    let secs: u64 = take_value(&args, &mut i, "--sweep-interval")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid sweep interval");
                            std::process::exit(1);
                        });
                    config.sweep_interval = Duration::from_secs(secs.max(1));
                }
                "--version" | "-v" => {
                    println!("slatekv {}", slatekv::VERSION);
                    std::process::exit(0);
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Reads the value following a flag, advancing the cursor past both.
fn take_value(args: &[String], i: &mut usize, flag: &str) -> String {
    if *i + 1 >= args.len() {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    }
    let value = args[*i + 1].clone();
    *i += 2;
    value
}

fn print_help() {
    println!(
        r#"slatekv - typed in-memory key-value store with snapshot persistence

USAGE:
    slatekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>             Host to bind to (default: {host})
    -p, --port <PORT>             Port to listen on (default: {port})
    -s, --snapshot <PATH>         Snapshot file (default: {snapshot})
        --sweep-interval <SECS>   Seconds between expiry sweeps (default: {sweep})
    -v, --version                 Print version information
        --help                    Print this help message

CONNECTING:
    Commands use a RESP-style protocol; plain lines work too:
    $ nc 127.0.0.1 {port}
    SET name "alice"
    +OK
    GET name
    $5
    alice
"#,
        host = slatekv::DEFAULT_HOST,
        port = slatekv::DEFAULT_PORT,
        snapshot = slatekv::DEFAULT_SNAPSHOT_FILE,
        sweep = DEFAULT_SWEEP_INTERVAL.as_secs(),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("slatekv {} starting", slatekv::VERSION);

    let store = Arc::new(TypedStore::new());

    // A missing snapshot is a fresh start; anything else on the load path
    // means the on-disk state is indeterminate, and we refuse to run.
    if config.snapshot.exists() {
        store
            .load_from_file(&config.snapshot)
            .with_context(|| format!("loading snapshot {}", config.snapshot.display()))?;
    } else {
        info!(path = %config.snapshot.display(), "no snapshot found, starting empty");
    }

    let sweeper = Sweeper::start(
        Arc::clone(&store),
        config.snapshot.clone(),
        config.sweep_interval,
    );

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;
    info!(addr = %config.bind_address(), "listening");

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("shutdown signal received");
    };

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&store), config.snapshot.clone()) => {}
        _ = shutdown => {}
    }

    // Final flush: the sweeper never runs a parting sweep, so this is the
    // one place the last mutations reach disk.
    sweeper.stop();
    if let Err(e) = store.save_to_file(&config.snapshot) {
        error!(error = %e, "final snapshot failed");
    } else {
        info!(path = %config.snapshot.display(), "final snapshot written");
    }

    info!("server shutdown complete");
    Ok(())
}

/// Accepts connections forever, one task per client.
async fn accept_loop(listener: TcpListener, store: Arc<TypedStore>, snapshot: PathBuf) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&store), snapshot.clone());
                tokio::spawn(serve_connection(stream, addr, handler));
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}
