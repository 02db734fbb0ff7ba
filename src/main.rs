use coachboard::api::routes::create_routes;
use coachboard::config::{run_migrations, AppConfig, DatabaseConfig, GoogleCalendarConfig, WebPushConfig};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let app_config = AppConfig::from_env()?;
    let db_config = DatabaseConfig::from_env()?;
    let google_config = GoogleCalendarConfig::from_env()?;
    let push_config = WebPushConfig::from_env()?;

    let pool = db_config.create_pool().await?;
    run_migrations(&pool).await?;

    let app = create_routes(pool, &app_config, google_config, push_config)?;

    let listener = TcpListener::bind(app_config.server_address()).await?;
    info!("Coachboard server starting on http://{}", app_config.server_address());
    info!("Health check available at /health");

    axum::serve(listener, app).await?;

    Ok(())
}
