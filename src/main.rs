mod app;

use anyhow::Result;
use clap::Parser;

use app::{config::setup, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = setup::init(&cli.config, cli.verbose)?;

    app::run(cli, settings).await
}
