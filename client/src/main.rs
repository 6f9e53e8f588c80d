use clap::Parser;
use client::network::Client;
use client::rendering::OutputMode;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:4000")]
    server: String,

    /// Name shown to your opponent
    #[arg(short = 'n', long)]
    name: String,

    /// Print events as JSON lines instead of a text board
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let mut client = Client::new(&args.server, &args.name, mode)?;
    client.run().await?;

    Ok(())
}
