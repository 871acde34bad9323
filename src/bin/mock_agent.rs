use polaris_agent::mock_agent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    mock_agent::serve().await?;
    Ok(())
}
