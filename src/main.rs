//! arkmesh command-line entry point.

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();
    cli::init_logging();
    cli::run().await
}
