//! Echo service: serves an endpoint and calls it from the same process.
//!
//! Run with:
//!   cargo run -p shmrpc --example echo --features demo -- hello world
//!
//! Try `--protocol simple --no-marshal` or `--log-level debug` to watch the
//! transport connect and close.

use clap::Parser;
use shmrpc::demo::DemoArgs;
use shmrpc::peer::{service_fn, Component, HandlerError, Transport};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "echo", about = "Echo strings through a shmrpc endpoint")]
struct Cli {
    #[command(flatten)]
    demo: DemoArgs,

    /// Messages to send.
    #[arg(default_value = "hello")]
    messages: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    cli.demo.init_logging();

    let transport: Transport<String, String> = Transport::new(cli.demo.config())?;
    let servers = transport.accept_servers(
        &cli.demo.name,
        service_fn(|message: String| async move { Ok::<_, HandlerError>(message) }),
    )?;
    servers.on_connected(|server| info!(connection = server.id(), "server connected"));
    servers.on_disconnected(|server| info!(connection = server.id(), "server disconnected"));

    let accessor = transport
        .connect_client(&cli.demo.name, false, None, None)
        .await?;
    let client = accessor.client().ok_or("client is not connected")?;
    info!(
        connection = client.id(),
        protocol = %client.protocol(),
        marshaled = client.is_marshaled(),
        "client connected"
    );

    for message in &cli.messages {
        let reply = client.invoke(message).await?;
        println!("{reply}");
    }

    client.close();
    Ok(())
}
