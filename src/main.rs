// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use resolver_lib::{
    ai::{OllamaDisambiguator, SharedDisambiguator},
    api::{build_router, AppState},
    cache::create_shared_cache,
    matching::MatchingService,
    sources::{HttpCandidateSource, InMemoryCandidateSource, SharedCandidateSource},
    utils::{
        config::{MatcherConfig, ServerConfig},
        env::init_logging,
    },
};

/// Organization name matching service
#[derive(Parser, Debug)]
#[command(name = "resolver", version, about)]
struct Args {
    /// Bind address (overrides RESOLVER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides RESOLVER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// JSON catalog for the in-memory candidate source (overrides CATALOG_PATH)
    #[arg(long)]
    catalog: Option<String>,
}

fn build_source(server: &ServerConfig, matcher: &MatcherConfig) -> Result<SharedCandidateSource> {
    if let Some(url) = &server.candidate_source_url {
        let source = HttpCandidateSource::new(url, server.candidate_source_api_key.clone(), matcher.search_timeout)
            .context("Failed to create HTTP candidate source")?;
        return Ok(Arc::new(source));
    }
    match &server.catalog_path {
        Some(path) => Ok(Arc::new(InMemoryCandidateSource::from_json_file(path)?)),
        None => Ok(Arc::new(InMemoryCandidateSource::new(Vec::new()))),
    }
}

fn build_disambiguator(server: &ServerConfig, matcher: &MatcherConfig) -> Option<SharedDisambiguator> {
    if !server.ai_enabled {
        return None;
    }
    match OllamaDisambiguator::new(server.ollama_config(matcher.ai_timeout)) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("⚠️ AI disambiguation unavailable, continuing without it: {:#}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("info");
    let args = Args::parse();

    info!("🚀 Starting organization resolver");

    let matcher = MatcherConfig::from_env();
    let mut server = ServerConfig::from_env();
    if let Some(host) = args.host {
        server.host = host;
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(catalog) = args.catalog {
        server.catalog_path = Some(catalog);
    }
    matcher.log_config();
    server.log_config();

    let source = build_source(&server, &matcher)?;
    let disambiguator = build_disambiguator(&server, &matcher);
    let cache = create_shared_cache(matcher.cache_max_entries_per_key);
    let service = MatchingService::new(matcher, source, disambiguator, cache);

    let addr = format!("{}:{}", server.host, server.port);
    let app = build_router(AppState::new(service, server));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("✅ Server ready on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;
    Ok(())
}
