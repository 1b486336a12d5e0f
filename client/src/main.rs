use clap::Parser;
use client::game::DEFAULT_LEAD_TICKS;
use client::network;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name shown on the scoreboard
    #[arg(short = 'n', long, default_value = "pilot")]
    name: String,

    /// Ticks to predict ahead of the newest snapshot
    #[arg(long, default_value_t = DEFAULT_LEAD_TICKS)]
    lead_ticks: u32,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {} as {}", args.server, args.name);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let mut client =
        network::Client::new(&args.server, &args.name, args.lead_ticks, args.fake_ping).await?;

    client.run().await?;

    Ok(())
}
