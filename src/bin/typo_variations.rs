// src/bin/typo_variations.rs - Inspect normalization, rewrites and typo variants for names
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use resolver_lib::matching::{
    normalize::{extract_abbreviation, normalize},
    rewrite::rewrite_query,
    typo::{detect_typo, generate_typo_variations},
};

/// Print what the matcher derives from each name, as pretty JSON.
#[derive(Parser, Debug)]
#[command(name = "typo_variations", version, about)]
struct Args {
    /// Names to inspect
    #[arg(required = true)]
    names: Vec<String>,

    /// Candidate names to check the input against for typos
    #[arg(long = "candidate")]
    candidates: Vec<String>,

    /// Cap on the number of typo variants printed per name
    #[arg(long, default_value_t = 25)]
    max_typos: usize,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("warn"));
    let args = Args::parse();

    for name in &args.names {
        let typos: Vec<String> = generate_typo_variations(name)
            .into_iter()
            .take(args.max_typos)
            .collect();
        let report = json!({
            "name": name,
            "normalized": normalize(name),
            "abbreviation": extract_abbreviation(name),
            "typoDetection": detect_typo(name, &args.candidates),
            "rewrite": rewrite_query(name),
            "typoVariations": typos,
        });
        let pretty = serde_json::to_string_pretty(&report).context("Failed to render report")?;
        println!("{}", pretty);
    }
    Ok(())
}
