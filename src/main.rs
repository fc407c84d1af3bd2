use adspace_gate::{
    AppState, AuthorizationCodeExchange, IdentityState, LoginExchangeState, ManagementApiStore,
    PermissionDecoder, PreferenceState, RouteTables, SessionCookieProvider,
    config::{AppConfig, Env},
    create_router,
    token_cache::{ClientCredentialsSource, ManagementTokenCache},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, builds the route tables and the
/// identity-provider clients, then serves the gate.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise debug for the gate and request logs from tower_http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "adspace_gate=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Route Tables
    // A broken table is a deployment error: refuse to start rather than guess.
    let routes = match config.route_table_path.as_deref() {
        Some(path) => {
            tracing::info!("Loading route table from {}", path);
            RouteTables::load(path)
        }
        None => RouteTables::builtin(),
    }
    .expect("FATAL: Route table is invalid. Check ROUTE_TABLE_PATH.");
    tracing::info!(
        "Route table ready: {} routes, locales {:?}",
        routes.paths.len(),
        routes.locales.locales()
    );

    // 5. Identity Provider
    let permissions = PermissionDecoder::from_config(&config)
        .expect("FATAL: Access token key is invalid. Check AUTH0_TOKEN_PUBLIC_KEY.");
    let identity = Arc::new(SessionCookieProvider::new(&config.session_secret)) as IdentityState;

    // 6. Identity Provider HTTP Client
    // One timeout for every call to the tenant.
    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout())
        .build()
        .expect("FATAL: Failed to build the HTTP client.");
    let login = Arc::new(AuthorizationCodeExchange::new(http.clone(), &config)) as LoginExchangeState;

    // 7. Preference Store (Management API)
    let tokens = Arc::new(
        ManagementTokenCache::new(Arc::new(ClientCredentialsSource::new(http.clone(), &config)))
            .with_fetch_timeout(config.upstream_timeout()),
    );
    let preferences =
        Arc::new(ManagementApiStore::new(http, &config, tokens)) as PreferenceState;

    // 8. Unified State Assembly
    let port = config.port;
    let app_state = AppState {
        identity,
        preferences,
        login,
        routes: Arc::new(routes),
        permissions: Arc::new(permissions),
        config,
    };

    // 9. Router and Server Startup
    let app = create_router(app_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
