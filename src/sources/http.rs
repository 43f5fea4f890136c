// src/sources/http.rs - Remote search index client
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::sources::{CandidateSource, SearchHit};

const DEFAULT_RESULT_LIMIT: usize = 10;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

/// `GET {base}/search?q=..&limit=..` returning `{"hits": [{entity, relevance}]}`.
pub struct HttpCandidateSource {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    limit: usize,
}

impl HttpCandidateSource {
    pub fn new(base_url: &str, api_key: Option<String>, request_timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid candidate source URL '{}'", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build candidate source HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            limit: DEFAULT_RESULT_LIMIT,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join("search")
            .context("Failed to build search URL")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &self.limit.to_string());
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let url = self.search_url(query)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Candidate source returned status: {}",
                response.status()
            ));
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse candidate source response")?;

        debug!("http search '{}' -> {} hits", query, body.hits.len());
        Ok(body
            .hits
            .into_iter()
            .map(|mut hit| {
                hit.relevance = hit.relevance.clamp(0.0, 1.0);
                hit
            })
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        let url = self.base_url.join("health").context("Failed to build health URL")?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .context("Candidate source health request failed")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Candidate source health returned status: {}",
                response.status()
            ));
        }
        Ok(())
    }
}
