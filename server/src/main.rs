use clap::Parser;
use log::info;
use server::network::Server;
use shared::GameSettings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Number of asteroids kept in the level while anyone is connected
    #[arg(short, long, default_value = "100")]
    asteroids: usize,

    /// Replication radius around each player; 0 disables relevance filtering
    #[arg(short, long, default_value = "40")]
    relevancy_radius: f32,

    /// Edge length of the cubic level
    #[arg(short, long, default_value = "80")]
    level_size: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let settings = GameSettings {
        tick_rate: args.tick_rate,
        level_width: args.level_size,
        level_height: args.level_size,
        level_depth: args.level_size,
        num_asteroids: args.asteroids,
        relevancy_radius: args.relevancy_radius,
        ..GameSettings::default()
    };
    settings.validate()?;

    info!("Starting server at {}Hz", args.tick_rate);
    info!(
        "Level {}^3, {} asteroids, relevancy radius {}",
        args.level_size, args.asteroids, args.relevancy_radius
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, settings, args.max_clients).await?;
    server.run().await?;

    Ok(())
}
