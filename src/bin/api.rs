use financial_planning_assistant::{
    api::start_server,
    engine::ChatEngine,
    gemini::GeminiClient,
    history::ChatHistoryStore,
    profile::ProfileStore,
    session::SessionStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 See .env.example for setup instructions");
        String::new()
    });

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Financial Planning Assistant - API Server");
    info!("📍 Port: {}", api_port);

    // Create components
    let gemini = GeminiClient::new(gemini_api_key);
    let sessions = SessionStore::new();
    sessions.spawn_sweeper(Duration::from_secs(300));
    let history = Arc::new(ChatHistoryStore::from_env());
    let profiles = Arc::new(ProfileStore::from_env());

    let engine = Arc::new(ChatEngine::new(
        gemini,
        sessions,
        history,
        Arc::clone(&profiles),
    ));

    info!("✅ Chat engine initialized");
    info!("📡 Starting API server...");

    // Start API server
    start_server(engine, profiles, api_port).await?;

    Ok(())
}
