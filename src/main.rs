use anyhow::Result;
use clap::Parser;
use creditunion::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    creditunion::observability::init(cli.verbose, cli.log_json);
    cli.run().await
}
