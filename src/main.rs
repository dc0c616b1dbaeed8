mod auth;
mod config;
mod db;
mod fanout;
mod history;
mod registry;
mod routes;
mod state;
mod store;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use config::{generate_config_template, Config};
use fanout::AdminFanout;
use registry::TrackerRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "fieldtrack_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "fieldtrack_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Fieldtrack server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    // Handle --mint-token: create the identity in the user store, print a
    // signed access token, and exit. Token issuance is otherwise external;
    // this is the operator path for provisioning clients.
    if let Some(identity) = &config.mint_token {
        store::upsert_user(&db, identity, config.admin)?;
        let token =
            auth::jwt::issue_access_token(&jwt_secret, identity, config.admin, config.token_ttl_secs)?;
        println!("{}", token);
        return Ok(());
    }

    // Build shared state: registry, fan-out set, store writer queue
    let registry = Arc::new(TrackerRegistry::new(config.history_cap));
    let admins = Arc::new(AdminFanout::new());
    let store_tx = store::spawn_store_writer(db.clone(), config.store_queue_capacity);

    let app_state = state::AppState {
        db,
        jwt_secret,
        registry,
        admins,
        store_tx,
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
