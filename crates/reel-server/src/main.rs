//! Reel server binary

use clap::Parser;
use reel_server::{cli::Cli, start_server};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.load_config() {
        Ok(config) => start_server(config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
