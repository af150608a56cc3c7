#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ucp_adapter::{Adapter, EscalationConfig, OauthAdapter, WcAdapter};
use ucp_adapter::wc::BatchStrategy;
use ucp_config::BackendConfig;
use ucp_core::AgentProfile;
use ucp_gateway::middleware::CorsConfig;
use ucp_gateway::{build_app, AppState};
use ucp_profile_cache::ProfileCache;
use ucp_upstream::{OauthConfig, WcConfig};

/// Maximum entries kept in the agent-profile cache (§4.1).
const PROFILE_CACHE_MAX_ENTRIES: usize = 1000;
/// Per-request read/write timeouts for the profile-fetch client (§5).
const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// Graceful-shutdown drain window (§5).
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "ucp-gateway", version, about = "Universal Commerce Protocol gateway")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8088")]
    bind: String,

    /// Enable debug-level request/response logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("ucp=debug,ucp_gateway=debug")
    } else {
        EnvFilter::new("ucp=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ucp_config::load_config_from_env_or_file().context("load gateway configuration")?;
    for warning in ucp_config::validate_config(&config).context("validate gateway configuration")? {
        tracing::warn!(%warning, "configuration warning");
    }

    let merchant_profile = AgentProfile {
        version: config.protocol_version.clone(),
        capabilities: config.capabilities.clone(),
        payment_handlers: config.payment_handlers.clone(),
    };
    let escalation = EscalationConfig::new(
        config.escalation.product_ids.clone(),
        config.escalation.custom_fields.clone(),
    );
    let domain = config
        .store_domain
        .clone()
        .unwrap_or_else(|| ucp_config::derive_store_domain(config.backend.store_url()));

    let adapter: Arc<dyn Adapter> = match &config.backend {
        BackendConfig::Wc {
            store_url,
            api_key,
            api_secret,
        } => Arc::new(WcAdapter::new(
            WcConfig {
                store_url: store_url.clone(),
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
            },
            domain,
            merchant_profile.clone(),
            escalation,
            BatchStrategy::default(),
        )),
        BackendConfig::Oauth { store_url, wix_client_id } => Arc::new(OauthAdapter::new(
            OauthConfig {
                store_url: store_url.clone(),
                client_id: wix_client_id.clone(),
            },
            domain,
            merchant_profile.clone(),
            escalation,
        )),
    };

    let profile_client = reqwest::Client::builder()
        .timeout(PROFILE_FETCH_TIMEOUT)
        .build()
        .context("build profile-fetch client")?;
    let profile_cache = ProfileCache::new(profile_client, PROFILE_CACHE_MAX_ENTRIES);

    let state = Arc::new(AppState {
        adapter,
        merchant_profile,
        profile_cache,
        cors: CorsConfig {
            allowed_origins: vec!["*".into()],
            allowed_methods: vec!["GET".into(), "POST".into(), "PUT".into()],
            allowed_headers: vec!["content-type".into(), "ucp-agent".into()],
        },
    });

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, "ucp-gateway listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut serve_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::signal::ctrl_c().await.ok();
    let _ = shutdown_tx.send(());
    info!("shutdown signal received, draining for up to {:?}", SHUTDOWN_DRAIN);

    match tokio::time::timeout(SHUTDOWN_DRAIN, &mut serve_task).await {
        Ok(Ok(result)) => result.context("serve"),
        Ok(Err(join_err)) => Err(join_err).context("serve task panicked"),
        Err(_) => {
            tracing::warn!("drain deadline of {:?} exceeded, forcing shutdown", SHUTDOWN_DRAIN);
            serve_task.abort();
            Ok(())
        }
    }
}
