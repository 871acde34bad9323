use anyhow::Context;
use polaris_agent::message_store::MessageStore;
use polaris_agent::server;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let store = Arc::new(MessageStore::open_from_env().context("Failed to open message store")?);
    server::serve(store).await
}
