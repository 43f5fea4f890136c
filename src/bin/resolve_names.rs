// src/bin/resolve_names.rs - Offline batch resolution of a names file against a JSON catalog
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde_json::json;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;
use std::time::Instant;

use resolver_lib::{
    cache::create_shared_cache,
    matching::MatchingService,
    models::{MatchQuery, MatchResult},
    sources::InMemoryCandidateSource,
    utils::{config::MatcherConfig, env::init_logging, get_memory_usage, progress_config::ProgressConfig},
};

/// Resolve one organization name per line and write JSON lines.
#[derive(Parser, Debug)]
#[command(name = "resolve_names", version, about)]
struct Args {
    /// JSON array of candidate entities
    #[arg(long)]
    catalog: String,

    /// Input file with one name per line
    #[arg(long)]
    input: String,

    /// Output file (stdout when omitted)
    #[arg(long)]
    output: Option<String>,
}

fn read_names(path: &str) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("Failed to open names file {}", path))?;
    let mut names = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("Failed to read {}", path))?;
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            names.push(trimmed.to_string());
        }
    }
    Ok(names)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("warn");
    let args = Args::parse();
    let start_time = Instant::now();

    let config = MatcherConfig::from_env();
    let progress = ProgressConfig::from_env();
    let chunk_size = config.batch_max_size.max(1);

    let source = InMemoryCandidateSource::from_json_file(&args.catalog)?;
    let cache = create_shared_cache(config.cache_max_entries_per_key);
    let service = MatchingService::new(config, Arc::new(source), None, cache.clone());

    let names = read_names(&args.input)?;
    info!("Resolving {} names from {}", names.len(), args.input);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let multi = progress.create_multi_progress();
    let bar = multi
        .as_ref()
        .map(|m| progress.create_bar(m, names.len() as u64, "Resolving names"));

    let mut counts = [0usize; 4];
    for (chunk_index, chunk) in names.chunks(chunk_size).enumerate() {
        let queries: Vec<MatchQuery> = chunk.iter().map(MatchQuery::new).collect();
        let results = service.match_batch(&queries).await;

        for (offset, (name, result)) in chunk.iter().zip(results).enumerate() {
            let index = chunk_index * chunk_size + offset;
            let line = match result {
                Ok(outcome) => {
                    let (slot, best) = match &outcome.result {
                        MatchResult::Match(c) => (0, Some(c)),
                        MatchResult::PotentialMatches(list) => (1, list.first()),
                        MatchResult::NoMatch => (2, None),
                    };
                    counts[slot] += 1;
                    json!({
                        "index": index,
                        "name": name,
                        "status": outcome.result.status(),
                        "entityId": best.map(|c| c.entity.id.clone()),
                        "canonicalName": best.map(|c| c.entity.canonical_name.clone()),
                        "confidence": best.map(|c| c.final_confidence),
                    })
                }
                Err(e) => {
                    counts[3] += 1;
                    warn!("Failed to resolve '{}': {}", name, e);
                    json!({"index": index, "name": name, "status": "error", "error": e.to_string()})
                }
            };
            writeln!(out, "{}", line).context("Failed to write result")?;
        }

        if let Some(pb) = &bar {
            pb.inc(chunk.len() as u64);
            if let Some(suffix) = progress.status_suffix(&cache).await {
                pb.set_message(format!("Resolving names {}", suffix));
            }
        }
    }
    out.flush().context("Failed to flush output")?;

    if let Some(pb) = bar {
        pb.finish_with_message("Done");
    }
    if progress.should_show_memory() {
        info!("Final memory usage: {} MB", get_memory_usage().await);
    }
    info!(
        "Resolved {} names in {:.2?}: {} matched, {} potential, {} unmatched, {} errors",
        names.len(),
        start_time.elapsed(),
        counts[0],
        counts[1],
        counts[2],
        counts[3]
    );
    Ok(())
}
