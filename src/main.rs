//! Service entry point: load configuration, initialise tracing, wire the
//! discovery pipeline bottom-up (providers and limiters, registries,
//! verifier, normalizer, adapters, finders, engine), then serve the quote
//! API and metrics until Ctrl-C.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use routescout::adapters::{AdapterRegistry, AggregatorVenueAdapter, DexRouterAdapter, VenueAdapter};
use routescout::bridges::{BridgeQuoteProvider, HttpBridgeProvider};
use routescout::config::Config;
use routescout::cross::CrossChainFinder;
use routescout::decimals::DecimalsCache;
use routescout::engine::RouteEngine;
use routescout::metrics::start_metrics_server;
use routescout::normalizer::RouteNormalizer;
use routescout::path::{MultiHopRouter, SameChainFinder};
use routescout::providers::ProviderFactory;
use routescout::rate_limiter::RateLimiterRegistry;
use routescout::registry::{CrossChainTokenMap, DexRegistry, TokenRegistry};
use routescout::server::start_api_server;
use routescout::verifier::{QuoteVerifier, RpcAmountsOutProbe};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("ethers_providers=warn".parse()?)
        .add_directive("ethers=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ROUTESCOUT_CONFIG").ok())
        .unwrap_or_else(|| "config".to_string());
    let config = Config::load_from_directory(&config_dir).await?;
    info!(
        chains = config.chains.len(),
        aggregators = config.aggregators.len(),
        bridges = config.bridge_providers.len(),
        "Configuration loaded from {config_dir}"
    );

    let shutdown = CancellationToken::new();

    // Shared infrastructure.
    let providers = Arc::new(ProviderFactory::from_config(&config));
    let limiters = Arc::new(RateLimiterRegistry::new(config.rate_limiter.clone()));
    for chain in config.chains.values() {
        limiters.get_or_create(
            chain.chain_id,
            &chain.chain_name,
            chain.rps_limit,
            chain.max_concurrent_requests,
        );
    }

    // Registries.
    let tokens = Arc::new(TokenRegistry::from_config(&config));
    let dexs = Arc::new(DexRegistry::from_config(&config));
    let cross_map = Arc::new(CrossChainTokenMap::from_config(&config, tokens.clone()));
    let decimals = Arc::new(DecimalsCache::new(
        tokens.clone(),
        providers.clone(),
        limiters.clone(),
    ));

    // Verification and normalization.
    let probe = Arc::new(RpcAmountsOutProbe::new(
        providers.clone(),
        limiters.clone(),
        tokens.clone(),
    ));
    let verifier = Arc::new(QuoteVerifier::new(probe, dexs.clone(), &config.verifier));
    let normalizer = Arc::new(RouteNormalizer::new(
        tokens.clone(),
        decimals.clone(),
        config.routing.clone(),
    ));

    // One DEX adapter per venue id, spanning every chain that configures it.
    let mut venue_chains: BTreeMap<String, (u32, Vec<u64>)> = BTreeMap::new();
    for chain in config.chains.values() {
        for dex in &chain.dexs {
            let entry = venue_chains
                .entry(dex.id.clone())
                .or_insert((dex.priority, Vec::new()));
            entry.0 = entry.0.min(dex.priority);
            entry.1.push(chain.chain_id);
        }
    }
    let mut adapters: Vec<Arc<dyn VenueAdapter>> = venue_chains
        .into_iter()
        .map(|(id, (priority, chains))| {
            Arc::new(DexRouterAdapter::new(
                id,
                priority,
                chains,
                verifier.clone(),
                normalizer.clone(),
            )) as Arc<dyn VenueAdapter>
        })
        .collect();
    for aggregator in &config.aggregators {
        adapters.push(Arc::new(AggregatorVenueAdapter::new(
            aggregator,
            normalizer.clone(),
        )));
    }
    let adapter_registry = Arc::new(AdapterRegistry::new(adapters));
    info!(adapters = adapter_registry.len(), "Adapter registry ready");

    let bridges: Vec<Arc<dyn BridgeQuoteProvider>> = config
        .bridge_providers
        .iter()
        .map(|p| Arc::new(HttpBridgeProvider::new(p)) as Arc<dyn BridgeQuoteProvider>)
        .collect();

    // Finders and the engine.
    let samechain = Arc::new(SameChainFinder::new(
        verifier.clone(),
        dexs.clone(),
        tokens.clone(),
        config.routing.top_intermediaries,
    ));
    let cross = Arc::new(CrossChainFinder::new(
        samechain.clone(),
        tokens.clone(),
        cross_map,
        bridges,
        config.verifier.max_concurrency,
    ));
    let multihop = Arc::new(MultiHopRouter::new(
        adapter_registry,
        tokens.clone(),
        normalizer.clone(),
        cross.clone(),
        config.verifier.max_concurrency,
    ));
    let engine = Arc::new(RouteEngine::new(
        samechain,
        multihop,
        cross,
        normalizer,
        tokens,
        decimals,
        config.routing.clone(),
        shutdown.clone(),
    ));

    let metrics_handle =
        start_metrics_server(config.server.bind.clone(), config.server.metrics_port);
    let api_handle = start_api_server(engine, &config.server, shutdown.clone());

    match signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl-C: {e}"),
    }
    shutdown.cancel();
    if let Err(e) = api_handle.await {
        error!("API server task failed: {e}");
    }
    metrics_handle.abort();
    info!("Shutdown complete");
    Ok(())
}
