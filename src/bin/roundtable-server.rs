// Standalone round-table server binary

use std::sync::Arc;

use anyhow::Result;

use roundtable::{http_server, OpenRouterClient, RoomManager, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env();
    if settings.openrouter_api_key.is_empty() {
        eprintln!("[Server] Warning: OPENROUTER_API_KEY is not set; generation calls will fail");
    }
    let client = Arc::new(OpenRouterClient::new(&settings)?);
    let port = settings.http_port;
    let manager = RoomManager::new(client, settings);
    http_server::run(manager, port).await
}
