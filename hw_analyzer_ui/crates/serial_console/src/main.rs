use backend_link::{BackendLink, LinkConfig, ServerMessage, DEFAULT_URL};
use clap::Parser;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "serial_console")]
struct Args {
    #[arg(long, default_value = DEFAULT_URL)]
    url: String,

    /// Print the backend's serial ports before doing anything else.
    #[arg(long, default_value_t = false)]
    list: bool,

    /// Serial port to open; stdin lines are written to it.
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    #[arg(long, default_value_t = 3000)]
    reconnect_delay_ms: u64,

    #[arg(long, default_value_t = 5000)]
    reply_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = LinkConfig::new(&args.url)?
        .with_reconnect_delay(Duration::from_millis(args.reconnect_delay_ms))
        .with_reply_timeout(Duration::from_millis(args.reply_timeout_ms));
    let link = BackendLink::new(config);

    let mut states = link.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::info!(%state, "backend link state changed");
        }
    });

    link.connect()
        .await
        .map_err(|e| anyhow::anyhow!("could not reach backend at {}: {e}", args.url))?;

    let notifications = link.on_message(print_message);

    if args.list {
        let ports = link.list_ports().await;
        if ports.is_empty() {
            eprintln!("no serial ports reported");
        }
        for p in &ports {
            println!("{}\t{}", p.name, p.desc);
        }
    }

    let Some(port) = args.port.as_deref() else {
        notifications.unsubscribe();
        link.disconnect();
        return Ok(());
    };

    link.open_port(port, args.baud);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        link.write_data(&format!("{line}\n"));
    }

    link.close_port();
    // Give the close command a moment to leave before the socket goes away.
    tokio::time::sleep(Duration::from_millis(100)).await;
    notifications.unsubscribe();
    link.disconnect();
    Ok(())
}

fn print_message(msg: &ServerMessage) {
    match msg {
        ServerMessage::Rx { data } => print!("{data}"),
        ServerMessage::Status { message } => eprintln!("status: {message}"),
        ServerMessage::Error { message } => eprintln!("error: {message}"),
        ServerMessage::Ports { .. } => {}
    }
}
