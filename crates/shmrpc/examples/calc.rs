//! Calculator service with one acceptor and several clients.
//!
//! Run with:
//!   cargo run -p shmrpc --example calc --features demo -- --clients 3

use clap::Parser;
use serde::{Deserialize, Serialize};
use shmrpc::demo::DemoArgs;
use shmrpc::peer::{service_fn, Component, HandlerError, PeerError, Transport};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum Op {
    Add(i64, i64),
    Sub(i64, i64),
    Mul(i64, i64),
    Div(i64, i64),
}

#[derive(Debug, thiserror::Error)]
enum CalcError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0:?} overflows")]
    Overflow(Op),
}

fn evaluate(op: Op) -> Result<i64, CalcError> {
    let value = match op {
        Op::Add(a, b) => a.checked_add(b),
        Op::Sub(a, b) => a.checked_sub(b),
        Op::Mul(a, b) => a.checked_mul(b),
        Op::Div(_, 0) => return Err(CalcError::DivisionByZero),
        Op::Div(a, b) => a.checked_div(b),
    };
    value.ok_or(CalcError::Overflow(op))
}

#[derive(Parser, Debug)]
#[command(name = "calc", about = "Arithmetic over a shmrpc endpoint")]
struct Cli {
    #[command(flatten)]
    demo: DemoArgs,

    /// Number of concurrent clients.
    #[arg(long, default_value_t = 2)]
    clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    cli.demo.init_logging();

    let transport = Transport::<Op, i64>::new(cli.demo.config())?;
    let acceptor = transport.make_server_acceptor(
        &cli.demo.name,
        service_fn(|op: Op| async move { evaluate(op).map_err(HandlerError::from) }),
    )?;
    acceptor.on_accepted(|server| info!(connection = server.id(), "accepted"));
    acceptor.on_error(|err| warn!(error = %err, "call failed"));

    let connector = transport.make_client_connector();
    let mut tasks = Vec::new();
    for worker in 0..cli.clients {
        let client = connector.connect(&cli.demo.name, None).await?;
        tasks.push(tokio::spawn(async move {
            let n = worker as i64;
            for op in [Op::Add(n, 40), Op::Sub(n, 1), Op::Mul(n, 3), Op::Div(84, n)] {
                match client.invoke(&op).await {
                    Ok(value) => println!("client {worker}: {op:?} = {value}"),
                    Err(PeerError::Transport(err)) => println!("client {worker}: {op:?} failed: {err}"),
                    Err(err) => return Err(err),
                }
            }
            client.close();
            Ok(())
        }));
    }

    for task in tasks {
        task.await??;
    }
    acceptor.close();
    Ok(())
}
