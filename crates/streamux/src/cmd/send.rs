use std::fs;
use std::time::Duration;

use bytes::Bytes;
use streamux_conn::{HandshakeConfig, MultiplexConfig, Sender, SenderConfig};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{conn_error, io_error, CliResult, SUCCESS};
use crate::output::{print_send_summary, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = sender_config(&args)?;
    let payloads = resolve_payloads(&args)?;

    let mut sender = Sender::bind(args.addr.as_str(), config)
        .map_err(|err| conn_error("bind failed", err))?;
    for payload in payloads {
        sender
            .register(payload)
            .map_err(|err| conn_error("register failed", err))?;
    }

    let summary = sender
        .run()
        .map_err(|err| conn_error("send failed", err))?;
    print_send_summary(&summary, format);

    Ok(SUCCESS)
}

fn sender_config(args: &SendArgs) -> CliResult<SenderConfig> {
    let timeout = parse_duration(&args.timeout)?;
    let fin_ack_linger = args
        .fin_ack_linger
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    Ok(SenderConfig {
        handshake: HandshakeConfig {
            timeout,
            fin_ack_linger,
        },
        multiplex: MultiplexConfig {
            chunk_size: args.chunk_size,
            frame_fraction: args.fraction,
        },
        pacing: Duration::from_micros(args.pacing_us),
        connection_id: args.connection_id,
        ..SenderConfig::default()
    })
}

/// One stream per `--data` value, then one per `--file`, in argument order.
fn resolve_payloads(args: &SendArgs) -> CliResult<Vec<Bytes>> {
    let mut payloads: Vec<Bytes> = args
        .data
        .iter()
        .map(|text| Bytes::copy_from_slice(text.as_bytes()))
        .collect();

    for path in &args.file {
        let data = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        payloads.push(Bytes::from(data));
    }
    Ok(payloads)
}
