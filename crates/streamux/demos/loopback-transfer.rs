//! Loopback transfer: one receiver thread, one sender, three streams over UDP.
//!
//! Run with:
//!   cargo run -p streamux --example loopback-transfer

use std::thread;

use streamux::conn::{Receiver, ReceiverConfig, Sender, SenderConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut receiver = Receiver::bind("127.0.0.1:0", ReceiverConfig::default())?;
    let addr = receiver.local_addr()?;

    let server = thread::spawn(move || -> Result<(), streamux::conn::ConnError> {
        receiver.serve()?;
        for summary in receiver.reassembler().summaries() {
            eprintln!(
                "[receiver] stream={} bytes={} frames={}",
                summary.stream_id, summary.bytes_received, summary.packets_received
            );
        }
        Ok(())
    });

    let mut sender = Sender::bind(addr, SenderConfig::default())?;
    sender.register(&b"a short text stream"[..])?;
    sender.register(vec![0xAB; 64 * 1024])?;
    sender.register((0..=255u8).cycle().take(10_000).collect::<Vec<u8>>())?;

    let summary = sender.run()?;
    eprintln!(
        "[sender] {} bytes in {} data packets (chunk {} bytes)",
        summary.bytes_sent, summary.data_packets, summary.chunk_size
    );

    server
        .join()
        .map_err(|_| "receiver thread panicked")??;
    Ok(())
}
