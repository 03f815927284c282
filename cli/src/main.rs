use clap::Parser;
use llmsgen_cli::{Cli, init_logging, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let output = run(cli).await?;
    println!("{}", output.display());
    Ok(())
}
