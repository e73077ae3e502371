use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use tokio::sync::mpsc;

use photodiode_rs::csv_log::CsvLog;
use photodiode_rs::nus_client::{is_device_not_found, NusClient, NusClientConfig, NusHandle};
use photodiode_rs::protocol::{DEFAULT_CSV_PATH, DEFAULT_MAX_WRITE_SIZE};
use photodiode_rs::session::{self, Uplink};
use photodiode_rs::simulate::{spawn_simulator, LoopbackUplink};
use photodiode_rs::types::SessionEnd;

/// Stream photodiode frames from a Nordic UART device into a CSV log.
///
/// Lines typed on stdin are sent to the device.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// CSV log to create (truncated on start)
    #[arg(long, default_value = DEFAULT_CSV_PATH)]
    csv: PathBuf,

    /// Seconds to scan for a device before giving up
    #[arg(long, default_value_t = 15)]
    scan_timeout: u64,

    /// Only connect to devices whose advertised name starts with this prefix
    #[arg(long)]
    name: Option<String>,

    /// Largest payload per RX write, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_WRITE_SIZE)]
    max_write_size: usize,

    /// Generate synthetic frames instead of connecting to hardware
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=photodiode_rs=debug cargo run
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    // ── CSV ───────────────────────────────────────────────────────────────────
    let log = CsvLog::create(&args.csv)?;
    info!("Logging to {}", log.path().display());

    // ── Connect ───────────────────────────────────────────────────────────────
    let (events, uplink, handle): (_, Arc<dyn Uplink>, Option<Arc<NusHandle>>) = if args.simulate {
        let (tx, rx) = mpsc::channel(256);
        spawn_simulator(tx);
        let uplink: Arc<dyn Uplink> = Arc::new(LoopbackUplink {
            max_write_size: args.max_write_size.max(1),
        });
        (rx, uplink, None)
    } else {
        let config = NusClientConfig {
            scan_timeout_secs: args.scan_timeout,
            name_prefix: args.name.clone(),
            max_write_size: args.max_write_size,
        };
        match NusClient::new(config).connect().await {
            Ok((rx, handle)) => {
                let handle = Arc::new(handle);
                (rx, Arc::clone(&handle) as Arc<dyn Uplink>, Some(handle))
            }
            Err(e) if is_device_not_found(&e) => {
                error!("{e:#}");
                println!("No matching device found. Use --name to narrow the search or --scan-timeout to wait longer.");
                std::process::exit(1);
            }
            Err(e) => {
                error!("Connection failed: {e:#}");
                println!("Error: {e:#}");
                std::process::exit(1);
            }
        }
    };

    println!("Connected. Start typing and press ENTER to send data...");

    // ── Stdin reader ──────────────────────────────────────────────────────────
    // Blocking reads live on a dedicated OS thread so they never stall the
    // notification path. Lines keep their trailing newline.
    let (line_tx, line_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut stdin = stdin.lock();
        loop {
            let mut line = Vec::new();
            match stdin.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("stdin read error: {e}");
                    break;
                }
            }
        }
    });

    // ── Stream ────────────────────────────────────────────────────────────────
    let end = session::run(uplink, events, line_rx, &log).await;

    match end {
        SessionEnd::PeripheralDisconnected => println!("Device was disconnected. Goodbye."),
        SessionEnd::InputClosed | SessionEnd::Interrupted => {
            if let Some(h) = &handle {
                if let Err(e) = h.disconnect().await {
                    error!("Disconnect error: {e}");
                }
            }
            info!("Disconnected.");
        }
    }

    Ok(())
}
