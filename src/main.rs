use clap::Parser;
use log::error;

use poll_tracker::commands::{self, Cli};

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = commands::run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
