use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use relay_broker::config::Config;
use relay_broker::state::AppState;
use relay_broker::store::{CredentialStore, InMemoryStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_broker=info".into()),
        )
        .init();

    let config = Config::from_env().unwrap_or_else(|err| {
        eprintln!("failed to load configuration: {err}");
        std::process::exit(1);
    });

    let listen_port = config.listen_port;
    let store: Arc<dyn CredentialStore> = Arc::new(InMemoryStore::new());
    let state = AppState::new(store, config);
    let app = relay_broker::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
    info!("relay broker listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
