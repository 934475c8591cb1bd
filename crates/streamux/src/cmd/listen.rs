use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use streamux_conn::{Receiver, ReceiverConfig, ReceiverState, StreamId};
use tracing::info;

use crate::cmd::ListenArgs;
use crate::exit::{conn_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listen_report, ListenReport, OutputFormat, StreamReport};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ReceiverConfig {
        require_handshake: !args.allow_unsolicited,
        ..ReceiverConfig::default()
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&shutdown))?;

    let mut receiver = Receiver::bind(args.addr.as_str(), config)
        .map_err(|err| conn_error("bind failed", err))?
        .with_shutdown(shutdown);

    receiver
        .serve()
        .map_err(|err| conn_error("receive failed", err))?;

    let state = receiver.state();
    if state != ReceiverState::Closed {
        info!(state = %state, "stopped before FIN");
    }

    let connection_id = receiver.connection_id();
    let peer = receiver.peer().map(|p| p.to_string());
    let stats = receiver.stats().clone();
    let throughput = receiver.throughput();
    let summaries = receiver.reassembler().summaries();
    let streams = receiver.into_reassembler().into_streams();

    let mut reports = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let saved_to = match (&args.output_dir, streams.get(&summary.stream_id)) {
            (Some(dir), Some(data)) => Some(save_stream(dir, summary.stream_id, data)?),
            _ => None,
        };
        reports.push(StreamReport { summary, saved_to });
    }

    let report = ListenReport {
        connection_id,
        peer,
        state: state.as_str(),
        streams: reports,
        stats,
        throughput,
    };
    print_listen_report(&report, format);

    Ok(SUCCESS)
}

fn save_stream(dir: &Path, stream_id: StreamId, data: &Bytes) -> CliResult<PathBuf> {
    fs::create_dir_all(dir)
        .map_err(|err| io_error(&format!("failed creating {}", dir.display()), err))?;
    let path = dir.join(format!("stream_{stream_id}.bin"));
    fs::write(&path, data)
        .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;
    Ok(path)
}

fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
