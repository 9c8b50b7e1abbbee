//! Storefront API server entry point.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use storefront_backend::{
    auth::{AuthState, CredentialIssuer, CredentialValidator, UserStore},
    build_router,
    middleware::AdmissionController,
    shop::{ShopState, ShopStore},
    AppServices, Config,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::parse();

    let secret = match config.signing_secret() {
        Ok(secret) => secret,
        Err(e) => {
            error!("❌ JWT_SECRET: {}", e);
            return Err(e).context("JWT_SECRET must be set to a non-empty value");
        }
    };
    let token_config = config.token_config()?;
    let rate_limits = config.rate_limit_config()?;

    info!("🚀 Storefront API starting");

    let user_store = Arc::new(UserStore::new(&config.db_path)?);
    if let Some((email, password)) = config.bootstrap_admin() {
        user_store.ensure_admin(email, password)?;
    }
    let shop_store = Arc::new(ShopStore::new(&config.db_path)?);
    info!("💾 Database ready at: {}", config.db_path);

    let limiter = AdmissionController::new(rate_limits);
    let sweeper = limiter.start_sweeper();
    info!(
        capacity = limiter.config().capacity,
        refill_per_sec = limiter.config().refill_per_sec,
        trust_proxy_headers = limiter.config().trust_proxy_headers,
        "🚦 Admission control active"
    );
    if config.allow_admin_signup {
        warn!("⚠️  ALLOW_ADMIN_SIGNUP is on: anyone can register an admin account");
    }

    let services = AppServices {
        auth: AuthState {
            user_store,
            issuer: Arc::new(CredentialIssuer::new(&secret, &token_config)),
            allow_admin_signup: config.allow_admin_signup,
        },
        shop: ShopState { store: shop_store },
        validator: Arc::new(CredentialValidator::new(&secret, &token_config)),
        limiter,
    };

    let app = build_router(services).layer(config.cors_layer()?);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    sweeper.stop().await;
    info!("👋 Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received, draining connections");
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate directory.
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_backend=debug,storefront=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
