use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lead_qualifier::config::Config;
use lead_qualifier::crm_client::{LeadSink, PipedriveClient};
use lead_qualifier::enrichment_client::{EnrichmentClient, RetryPolicy};
use lead_qualifier::fragment_cache::FragmentCache;
use lead_qualifier::handlers::{self, AppState};
use lead_qualifier::orchestrator::EnrichmentOrchestrator;
use lead_qualifier::pipeline::PipelineCoordinator;
use lead_qualifier::scoring::ScoringEngine;
use lead_qualifier::services::{AnthropicVacancyProvider, ApolloProvider, EnrichmentProvider};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Enrichment providers, retrying clients and the fragment cache.
/// - The pipeline coordinator and optional CRM writer.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_qualifier=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let retry = RetryPolicy::new(config.enrichment_max_attempts, config.retry_base_delay());

    // Content-keyed fragment cache shared by all enrichment clients
    let cache = (config.enrichment_cache_ttl_secs > 0).then(|| {
        FragmentCache::new(
            Duration::from_secs(config.enrichment_cache_ttl_secs),
            10_000,
        )
    });
    if cache.is_some() {
        tracing::info!(
            "Enrichment cache initialized ({}s TTL, 10k capacity)",
            config.enrichment_cache_ttl_secs
        );
    }

    let build_client = |provider: Arc<dyn EnrichmentProvider>| {
        let client = EnrichmentClient::new(provider, retry);
        Arc::new(match cache.clone() {
            Some(cache) => client.with_cache(cache),
            None => client,
        })
    };

    let apollo: Arc<dyn EnrichmentProvider> = Arc::new(ApolloProvider::new(&config));
    let orchestrator = EnrichmentOrchestrator::new(
        build_client(Arc::new(AnthropicVacancyProvider::new(&config))),
        build_client(apollo.clone()),
        build_client(apollo),
    )
    .with_deadline(config.enrichment_deadline());

    let coordinator = Arc::new(PipelineCoordinator::new(
        Arc::new(orchestrator),
        ScoringEngine::new(config.scoring()),
    ));
    tracing::info!("Pipeline coordinator initialized");

    // Initialize Pipedrive client (CRM push is skipped without a token)
    let crm: Option<Arc<dyn LeadSink>> = match config.pipedrive_token.clone() {
        Some(token) => match PipedriveClient::new(
            config.pipedrive_base_url.clone(),
            token,
            config.pipedrive_pipeline_id,
        ) {
            Ok(client) => {
                tracing::info!("✓ Pipedrive client initialized: {}", config.pipedrive_base_url);
                Some(Arc::new(client.with_stage(config.pipedrive_stage_id)))
            }
            Err(e) => {
                tracing::error!("Failed to initialize Pipedrive client: {}", e);
                None
            }
        },
        None => None,
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let app_state = Arc::new(AppState {
        coordinator,
        crm,
        http,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 5MB max payload
            .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
            // Rate limiting: 10 req/sec per IP, burst of 20
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
