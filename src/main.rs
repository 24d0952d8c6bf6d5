use anyhow::Context;
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use connectsphere::{AppState, db, rooms};
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = dotenv::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let db_pool = db::connect(&database_url).await?;
    let app_state = AppState::new(db_pool);

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(30)));

    let frontend_url =
        dotenv::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
    let cors = CorsLayer::new()
        .allow_origin(frontend_url.parse::<HeaderValue>().context("bad FRONTEND_URL")?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = Router::new()
        .route("/", get(healthcheck))
        .route("/ws", get(rooms::ws::chat_ws))
        .nest("/rooms", rooms::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(cors);

    let port: u16 = dotenv::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(%port, "connectsphere backend listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> &'static str {
    "ConnectSphere Backend Running"
}
