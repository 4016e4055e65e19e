use std::sync::Arc;

use clap::Parser;
use smcwatch::{
    assemble::Assembler,
    capture,
    cli::Cli,
    error::Result,
    flow::FlowTable,
    handler::PacketHandler,
    http,
    sink::{Output, SharedBuffer, Sink},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string())),
        )
        .with_writer(std::io::stderr)
        .init();

    // with --http the transcript goes into a buffer served by the output
    // server; binding happens up front so bad addresses fail startup
    let output = match &cli.http {
        Some(address) => {
            let buffer = SharedBuffer::new();
            let listener = http::bind(address).await?;
            let server_buffer = buffer.clone();
            tokio::spawn(async move {
                if let Err(e) = http::serve(listener, server_buffer).await {
                    error!("{e}");
                }
            });
            Output::Buffer(buffer)
        }
        None => Output::Stdout,
    };
    let sink = Arc::new(Sink::new(
        output,
        cli.show_timestamps,
        cli.show_reserved,
        cli.show_hex,
    ));

    let source = capture::start(&cli.capture_config())?;
    sink.print_line(&source.banner);

    let flows = Arc::new(FlowTable::new());
    let assembler = Assembler::new(Arc::clone(&flows), Arc::clone(&sink));
    let handler = PacketHandler::new(
        source.link,
        assembler,
        flows,
        Arc::clone(&sink),
        cli.pcap_maxpkts,
        cli.max_time(),
    );

    handler.run(source.packets).await;
    info!("capture finished");
    Ok(())
}
