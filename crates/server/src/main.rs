//! emissary server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use emissary_common::Config;
use emissary_federation::{
    ActivityStore, ApClient, BlocklistAuthorizer, FederatingActor, ForwardingDecider,
    HttpSignatureAuthenticator, HttpSigner, LoggingForwarder, LoggingHandler,
    MemoryActivityStore, MemoryBlockStore, RedisActivityStore, RemoteKeyResolver,
    SignedDeliverer, ValidatingDispatcher, handler::router,
};
use fred::prelude::*;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "emissary=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn activity_store(config: &Config) -> Result<Arc<dyn ActivityStore>, Box<dyn std::error::Error>> {
    let dedupe_ttl = Duration::from_secs(config.federation.dedupe_ttl_secs);
    let Some(redis) = &config.redis else {
        info!("No Redis configured, recording activities in memory");
        return Ok(Arc::new(MemoryActivityStore::with_ttl(dedupe_ttl)));
    };

    info!("Connecting to Redis...");
    let fred_config = fred::types::config::Config::from_url(&redis.url)?;
    let fred_client = fred::clients::Client::new(fred_config, None, None, None);
    fred_client.connect();
    fred_client.wait_for_connect().await?;
    info!("Connected to Redis");

    Ok(Arc::new(RedisActivityStore::new(
        Arc::new(fred_client),
        redis.prefix.clone(),
        dedupe_ttl,
    )))
}

async fn deliverer(
    config: &Config,
    public_url: &Url,
) -> Result<Option<SignedDeliverer>, Box<dyn std::error::Error>> {
    let Some(key) = &config.federation.signing_key else {
        return Ok(None);
    };

    let private_key_pem = tokio::fs::read_to_string(&key.private_key_file).await?;
    let signer = HttpSigner::new(&private_key_pem, key.key_id.clone())?;
    info!(key_id = %key.key_id, "Loaded signing key");

    Ok(Some(SignedDeliverer::new(
        ApClient::new(config.federation.user_agent.clone())?,
        signer,
        public_url.clone(),
    )))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    init_tracing(config.logging.json);
    info!("Starting emissary...");

    let public_url = config.server.public_url()?;
    let store = activity_store(&config).await?;

    let key_resolver = RemoteKeyResolver::new(ApClient::new(config.federation.user_agent.clone())?);
    let authenticator =
        HttpSignatureAuthenticator::new(key_resolver, config.federation.max_clock_skew_secs);

    let blocks = MemoryBlockStore::with_domains(&config.federation.blocked_domains);
    info!(
        blocked_domains = config.federation.blocked_domains.len(),
        "Loaded domain blocks"
    );

    let forwarding = ForwardingDecider::new(store, Arc::new(LoggingForwarder), public_url.clone());
    let actor = FederatingActor::new(
        Arc::new(authenticator),
        Arc::new(BlocklistAuthorizer::new(blocks)),
        Arc::new(ValidatingDispatcher::new(LoggingHandler)),
        forwarding,
    )
    .with_scheme(config.server.scheme.clone())
    .with_max_body_bytes(config.federation.max_body_bytes);

    let actor = match deliverer(&config, &public_url).await? {
        Some(deliverer) => actor.with_deliverer(Arc::new(deliverer)),
        None => {
            info!("No signing key configured, outbound sending disabled");
            actor
        }
    };

    let app = router(Arc::new(actor)).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
