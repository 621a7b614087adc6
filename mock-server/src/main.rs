use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "5984".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;

    let router = match (std::env::var("COUCHDB_USER"), std::env::var("COUCHDB_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => mock_server::app_with_credentials(user, password),
        _ => mock_server::app(),
    };
    mock_server::serve(listener, router).await
}
