use std::io::IsTerminal;
use std::path::PathBuf;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use streamux_conn::{ReceiverStats, SendSummary, StreamSummary, Throughput};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// What `listen` reports once its connection ends.
#[derive(Debug, Serialize)]
pub struct ListenReport {
    pub connection_id: Option<u32>,
    pub peer: Option<String>,
    pub state: &'static str,
    pub streams: Vec<StreamReport>,
    pub stats: ReceiverStats,
    /// Whole-connection rates, first to last DATA packet.
    pub throughput: Throughput,
}

#[derive(Debug, Serialize)]
pub struct StreamReport {
    #[serde(flatten)]
    pub summary: StreamSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
}

pub fn print_send_summary(summary: &SendSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "CONNECTION",
                    "PEER",
                    "STREAMS",
                    "BYTES",
                    "PACKETS",
                    "CHUNK",
                    "ELAPSED",
                ])
                .add_row(vec![
                    format!("{:#010x}", summary.connection_id),
                    summary.peer.to_string(),
                    summary.streams.to_string(),
                    summary.bytes_sent.to_string(),
                    summary.data_packets.to_string(),
                    summary.chunk_size.to_string(),
                    format!("{}ms", summary.elapsed_ms),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent {} bytes in {} streams to {} ({} data packets, chunk {} bytes, {}ms, fin_acked={})",
                summary.bytes_sent,
                summary.streams,
                summary.peer,
                summary.data_packets,
                summary.chunk_size,
                summary.elapsed_ms,
                summary.fin_acked
            );
        }
    }
}

pub fn print_listen_report(report: &ListenReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "STREAM", "BYTES", "FRAMES", "ELAPSED", "BYTES/S", "FRAMES/S", "SAVED TO",
                ]);
            for stream in &report.streams {
                let t = &stream.summary.throughput;
                table.add_row(vec![
                    stream.summary.stream_id.to_string(),
                    stream.summary.bytes_received.to_string(),
                    stream.summary.packets_received.to_string(),
                    elapsed_label(t.elapsed_us),
                    rate_label(t.bytes_per_sec),
                    rate_label(t.packets_per_sec),
                    stream
                        .saved_to
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{table}");
            println!(
                "connection {} {} ({} datagrams, {} dropped, {} malformed)",
                connection_label(report.connection_id),
                report.state,
                report.stats.datagrams,
                report.stats.dropped,
                report.stats.malformed
            );
            println!(
                "overall {} bytes/s, {} packets/s over {}",
                rate_label(report.throughput.bytes_per_sec),
                rate_label(report.throughput.packets_per_sec),
                elapsed_label(report.throughput.elapsed_us)
            );
        }
        OutputFormat::Pretty => {
            println!(
                "connection {} from {} {}",
                connection_label(report.connection_id),
                report.peer.as_deref().unwrap_or("-"),
                report.state
            );
            for stream in &report.streams {
                let t = &stream.summary.throughput;
                print!(
                    "stream={} bytes={} frames={} elapsed={} bytes_per_sec={} frames_per_sec={}",
                    stream.summary.stream_id,
                    stream.summary.bytes_received,
                    stream.summary.packets_received,
                    elapsed_label(t.elapsed_us),
                    rate_label(t.bytes_per_sec),
                    rate_label(t.packets_per_sec)
                );
                match &stream.saved_to {
                    Some(path) => println!(" saved={}", path.display()),
                    None => println!(),
                }
            }
            println!(
                "overall bytes_per_sec={} packets_per_sec={} elapsed={}",
                rate_label(report.throughput.bytes_per_sec),
                rate_label(report.throughput.packets_per_sec),
                elapsed_label(report.throughput.elapsed_us)
            );
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn elapsed_label(elapsed_us: u64) -> String {
    format!("{:.3}ms", elapsed_us as f64 / 1000.0)
}

fn rate_label(rate: f64) -> String {
    format!("{rate:.1}")
}

fn connection_label(id: Option<u32>) -> String {
    id.map(|id| format!("{id:#010x}"))
        .unwrap_or_else(|| "-".to_string())
}
