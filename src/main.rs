// src/main.rs
//
// bleuart command line: live scan from a serial port, replay of a captured
// byte stream, and serial port listing.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use clap::{Args, Parser, Subcommand};

use bleuart_lib::io::serial::{list_ports, MacOrder, SerialSource};
use bleuart_lib::logging::{init_file_logging, stop_file_logging};
use bleuart_lib::{
    tlog, ByteSource, JsonLinesSink, LogSink, QueuedSink, ReaderSource, RecordSink, ScanError,
    ScanSession, ScanSummary, ScannerSettings, WireVariant,
};

/// Buffers the output writer may fall behind before the scan loop waits
const OUTPUT_QUEUE_DEPTH: usize = 64;

#[derive(Parser)]
#[command(
    name = "bleuart",
    version,
    about = "Receive BLE advertisement buffers from a UART scanner board"
)]
struct Cli {
    /// Settings file (TOML). Defaults to <config dir>/bleuart/settings.toml if present.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Directory for session log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log to stderr only
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DecodeArgs {
    /// Wire layout: single, buffer or buffer_timestamped
    #[arg(long)]
    variant: Option<WireVariant>,

    /// MAC byte order override: stream or reversed
    #[arg(long)]
    mac_order: Option<MacOrder>,

    /// Write one JSON document per buffer to this file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Log every device, not just one line per buffer
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Read buffers from a serial port
    Scan {
        /// Serial port, e.g. /dev/ttyUSB0 or COM3
        #[arg(long, short)]
        port: Option<String>,

        #[arg(long, short)]
        baud: Option<u32>,

        /// Stop after this many seconds
        #[arg(long, short)]
        duration: Option<u64>,

        #[command(flatten)]
        decode: DecodeArgs,
    },
    /// Decode a file of raw bytes captured from the scanner
    Replay {
        file: PathBuf,

        #[command(flatten)]
        decode: DecodeArgs,
    },
    /// List serial ports
    ListPorts,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = run(cli).await;
    stop_file_logging();

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut settings = ScannerSettings::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = &cli.log_dir {
        settings.log_dir = dir.to_string_lossy().to_string();
    }
    if cli.no_file_log {
        settings.file_logging = false;
    }

    match cli.command {
        Command::ListPorts => print_ports(),

        Command::Scan {
            port,
            baud,
            duration,
            decode,
        } => {
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(baud) = baud {
                settings.baud_rate = baud;
            }
            if duration.is_some() {
                settings.duration_secs = duration;
            }
            let verbose = apply_decode_args(&mut settings, decode);
            start_file_logging(&settings);

            let options = settings.serial_options();
            run_session(&settings, verbose, move || SerialSource::open(&options))
                .await
                .map(|_| ())
        }

        Command::Replay { file, decode } => {
            let verbose = apply_decode_args(&mut settings, decode);
            // A capture has no wall-clock meaning
            settings.duration_secs = None;
            start_file_logging(&settings);

            run_session(&settings, verbose, move || {
                let name = file.display().to_string();
                let reader = File::open(&file)?;
                Ok(ReaderSource::new(BufReader::new(reader), name))
            })
            .await
            .map(|_| ())
        }
    }
}

fn apply_decode_args(settings: &mut ScannerSettings, args: DecodeArgs) -> bool {
    if let Some(variant) = args.variant {
        settings.variant = variant;
    }
    if args.mac_order.is_some() {
        settings.mac_order = args.mac_order;
    }
    if let Some(output) = args.output {
        settings.output = Some(output.to_string_lossy().to_string());
    }
    args.verbose
}

fn start_file_logging(settings: &ScannerSettings) {
    if !settings.file_logging {
        return;
    }
    if let Err(e) = init_file_logging(Path::new(&settings.log_dir)) {
        tlog!("[main] File logging disabled: {}", e);
    }
}

fn build_sink(settings: &ScannerSettings, verbose: bool) -> Result<Box<dyn RecordSink + Send>, String> {
    match &settings.output {
        Some(path) => {
            let file =
                File::create(path).map_err(|e| format!("Failed to create output {}: {}", path, e))?;
            tlog!("[main] Writing buffers to {}", path);
            let sink = QueuedSink::spawn(JsonLinesSink::new(BufWriter::new(file)), OUTPUT_QUEUE_DEPTH)?;
            Ok(Box::new(sink))
        }
        None if verbose => Ok(Box::new(LogSink::verbose())),
        None => Ok(Box::new(LogSink::new())),
    }
}

/// Open the source and run a session on a blocking thread. Ctrl-C stops it at
/// the next frame boundary.
async fn run_session<S, F>(settings: &ScannerSettings, verbose: bool, open: F) -> Result<ScanSummary, String>
where
    S: ByteSource + 'static,
    F: FnOnce() -> Result<S, ScanError> + Send + 'static,
{
    let mut sink = build_sink(settings, verbose)?;
    let decoder = settings.decoder();
    let config = settings.scan_config();
    tlog!(
        "[main] Variant {}, {} byte header, {} byte records",
        settings.variant,
        decoder.format().header_len(),
        decoder.format().record_len()
    );

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let signal_flag = cancel_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tlog!("[main] Interrupted, stopping after the current frame");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let task = tokio::task::spawn_blocking(move || {
        let source = open()?;
        let mut session = ScanSession::new(source, decoder)
            .with_config(config)
            .with_cancel_flag(cancel_flag);
        session.run(&mut sink)
    });

    task.await
        .map_err(|e| format!("Scan task failed: {}", e))?
        .map_err(|e| e.to_string())
}

fn print_ports() -> Result<(), String> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        let usb = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" {:04x}:{:04x}", vid, pid),
            _ => String::new(),
        };
        let product = port
            .product
            .or(port.manufacturer)
            .map(|p| format!(" {}", p))
            .unwrap_or_default();
        println!("{:<24} {}{}{}", port.port_name, port.port_type, usb, product);
    }
    Ok(())
}
