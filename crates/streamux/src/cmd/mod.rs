use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive one connection and report the streams it carried.
    Listen(ListenArgs),
    /// Send payloads as multiplexed streams.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (e.g. 0.0.0.0:9000).
    pub addr: String,
    /// Write each received stream to DIR/stream_<id>.bin.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
    /// Accept DATA and FIN without a preceding SYN.
    #[arg(long)]
    pub allow_unsolicited: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Receiver address (e.g. 127.0.0.1:9000).
    pub addr: String,
    /// Raw string payload, one stream each. Sent before --file streams.
    #[arg(long, value_name = "TEXT")]
    pub data: Vec<String>,
    /// Read a stream payload from file.
    #[arg(long, value_name = "PATH")]
    pub file: Vec<PathBuf>,
    /// Payload bytes per packet. Random in 1000..=2000 when omitted.
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,
    /// Share of active streams that contribute a frame to each packet.
    #[arg(long, default_value_t = streamux_conn::DEFAULT_FRAME_FRACTION)]
    pub fraction: f64,
    /// Delay between data packets in microseconds.
    #[arg(long, value_name = "MICROS", default_value_t = 500)]
    pub pacing_us: u64,
    /// Handshake timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Wait this long for a FIN-ACK after FIN (e.g. 1s).
    #[arg(long, value_name = "DURATION")]
    pub fin_ack_linger: Option<String>,
    /// Fixed connection id. Random when omitted.
    #[arg(long)]
    pub connection_id: Option<u32>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
