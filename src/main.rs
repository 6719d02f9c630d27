use clap::Parser;
use regstrategy::{cli, logging};

#[tokio::main]
async fn main() -> regstrategy::Result<()> {
    let args = cli::Args::parse();
    let _logging = logging::init(&args.command)?;
    cli::run(args).await
}
