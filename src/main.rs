#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keelson::cli::run_cli().await
}
