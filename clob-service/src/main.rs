mod routes;
mod state;
mod ws;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use clob_core::{AssetLedger, CoreConfig, InMemoryLedger};
use clob_ledger_client::{HttpLedgerClient, LedgerClientConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

fn main() {
    use std::io::Write;

    std::panic::set_hook(Box::new(|panic_info| {
        let _ = std::io::stderr().write_all(format!("PANIC: {panic_info:?}\n").as_bytes());
        let _ = std::io::stderr().flush();
        std::process::exit(1);
    }));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(tokio_main()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn cors_layer() -> CorsLayer {
    let allowed_headers = [AUTHORIZATION, CONTENT_TYPE, ACCEPT];
    let allowed_methods = [Method::GET, Method::POST, Method::OPTIONS];

    match std::env::var("CORS_ALLOWED_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if allowed.is_empty() {
                tracing::warn!("CORS_ALLOWED_ORIGINS set but no valid origins, falling back to dev defaults");
                dev_cors(&allowed_headers, &allowed_methods)
            } else {
                tracing::info!(?allowed, "CORS restricted to configured origins");
                CorsLayer::new()
                    .allow_origin(allowed)
                    .allow_methods(allowed_methods)
                    .allow_headers(allowed_headers)
                    .allow_credentials(true)
            }
        }
        Err(_) => dev_cors(&allowed_headers, &allowed_methods),
    }
}

fn dev_cors(allowed_headers: &[HeaderName], allowed_methods: &[Method]) -> CorsLayer {
    let dev_origins: Vec<HeaderValue> = ["http://localhost:5173", "http://localhost:3000"]
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(dev_origins)
        .allow_methods(allowed_methods.to_vec())
        .allow_headers(allowed_headers.to_vec())
        .allow_credentials(true)
}

async fn tokio_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clob_service=info,clob_core=info".into()),
        )
        .init();

    let config = CoreConfig::from_env();
    let balance_reconcile_interval = config.balance_reconcile_interval;

    let ledger: Arc<dyn AssetLedger> = if std::env::var("LEDGER_URL").is_ok() {
        tracing::info!("using HTTP ledger client");
        let mut ledger_config = LedgerClientConfig::from_env();
        ledger_config.retry = config.settle_retry.clone();
        Arc::new(HttpLedgerClient::new(ledger_config))
    } else {
        tracing::warn!("LEDGER_URL not set, running against an in-memory ledger (dev mode only)");
        Arc::new(InMemoryLedger::new())
    };

    let app_state = state::AppState::new(ledger, config);

    {
        let app_state = app_state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(balance_reconcile_interval);
            loop {
                ticker.tick().await;
                app_state.reconcile_balances().await;
            }
        });
    }

    let app = Router::new()
        .merge(routes::router())
        .route("/ws", get(ws::handler))
        .layer(cors_layer())
        .with_state(app_state);

    let bind_addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;

    tracing::info!(%bind_addr, "clob-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
