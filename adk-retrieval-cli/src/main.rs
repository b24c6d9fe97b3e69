use adk_retrieval_cli::{Cli, init_tracing, run};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);
    run(cli).await
}
