use clap::Parser;
use log::info;
use server::{FirstMove, Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "4000")]
    port: u16,

    /// Seconds each player may think over a whole game
    #[arg(short, long, default_value = "30")]
    time_limit: u32,

    /// Which of two paired players moves first
    #[arg(short, long, value_enum, default_value = "random")]
    first_move: FirstMove,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig::new(args.host, args.port, args.time_limit, args.first_move)?;
    let server = Server::bind(config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
