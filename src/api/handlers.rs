// src/api/handlers.rs - /match, /batch and /health
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use log::{info, warn};
use serde_json::{json, Value};
use std::time::Instant;
use tokio::time::timeout;
use uuid::Uuid;

use crate::api::dto::{BatchItem, BatchRequest, BatchResponse, MatchRequest, MatchResponse};
use crate::api::AppState;
use crate::errors::{ApiError, MatchError};
use crate::utils::get_memory_usage;

fn rejection(error: JsonRejection, request_id: &str) -> ApiError {
    ApiError::new(MatchError::validation(error.body_text()), request_id)
}

pub async fn match_company(
    State(state): State<AppState>,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> Result<Json<MatchResponse>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let Json(request) = payload.map_err(|e| rejection(e, &request_id))?;

    let query = request.into_query();
    let outcome = state
        .service
        .match_one_with_id(&query, &request_id)
        .await
        .map_err(|e| ApiError::new(e, request_id.clone()))?;

    Ok(Json(MatchResponse::from_outcome(request_id, outcome)))
}

pub async fn match_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let Json(request) = payload.map_err(|e| rejection(e, &request_id))?;

    let max = state.service.config().batch_max_size;
    if request.companies.is_empty() {
        return Err(ApiError::new(
            MatchError::validation("companies must contain at least one entry"),
            request_id,
        ));
    }
    if request.companies.len() > max {
        return Err(ApiError::new(
            MatchError::validation(format!("companies may contain at most {} entries", max)),
            request_id,
        ));
    }

    let start = Instant::now();
    let queries: Vec<_> = request
        .companies
        .iter()
        .map(|entry| entry.to_query(request.model.as_deref()))
        .collect();
    let outcomes = state.service.match_batch_with_id(&queries, &request_id).await;

    let results: Vec<BatchItem> = request
        .companies
        .iter()
        .zip(outcomes)
        .enumerate()
        .map(|(index, (entry, result))| BatchItem::from_result(&request_id, index, entry.company_name(), result))
        .collect();

    Ok(Json(BatchResponse {
        success: true,
        request_id,
        processed: results.len(),
        results,
        duration: start.elapsed().as_millis() as u64,
    }))
}

/// Pings a collaborator and reports `{status, latencyMs, error?}`.
async fn ping_service<F>(check: F, budget: std::time::Duration) -> (bool, Value)
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let start = Instant::now();
    let outcome = timeout(budget, check).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(Ok(())) => (true, json!({"status": "up", "latencyMs": latency_ms})),
        Ok(Err(e)) => (
            false,
            json!({"status": "down", "latencyMs": latency_ms, "error": format!("{:#}", e)}),
        ),
        Err(_) => (
            false,
            json!({"status": "down", "latencyMs": latency_ms, "error": "health check timed out"}),
        ),
    }
}

pub async fn health(State(state): State<AppState>) -> Response {
    let config = state.service.config();
    let source = state.service.source();
    let (source_up, mut source_report) = ping_service(source.health_check(), config.search_timeout).await;
    source_report["name"] = json!(source.name());

    let (ai_up, ai_report) = match state.service.disambiguator() {
        Some(ai) => {
            let (up, mut report) = ping_service(ai.health_check(), config.ai_timeout).await;
            report["name"] = json!(ai.name());
            (up, report)
        }
        None if state.config.ai_enabled => (false, json!({"status": "unavailable"})),
        None => (true, json!({"status": "disabled"})),
    };

    let (status, code) = if !source_up {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    } else if !ai_up {
        ("degraded", StatusCode::OK)
    } else {
        ("healthy", StatusCode::OK)
    };
    if status != "healthy" {
        warn!("🩺 Health check: {}", status);
    } else {
        info!("🩺 Health check: healthy");
    }

    let body = json!({
        "status": status,
        "services": {
            "candidateSource": source_report,
            "ai": ai_report,
            "cache": state.service.cache().stats(),
            "memory": {"usedMb": get_memory_usage().await},
        },
        "uptimeSecs": state.started.elapsed().as_secs(),
        "timestamp": chrono::Utc::now(),
    });
    (code, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{build_router, AppState};
    use crate::cache::create_shared_cache;
    use crate::matching::MatchingService;
    use crate::models::CandidateEntity;
    use crate::sources::{CandidateSource, InMemoryCandidateSource, SearchHit};
    use crate::utils::config::{MatcherConfig, ServerConfig};
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct DownSource;

    #[async_trait]
    impl CandidateSource for DownSource {
        fn name(&self) -> &str {
            "down"
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
            Err(anyhow::anyhow!("connection refused"))
        }

        async fn health_check(&self) -> Result<()> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    fn catalog() -> Arc<InMemoryCandidateSource> {
        Arc::new(InMemoryCandidateSource::new(vec![
            CandidateEntity::new("ibm", "International Business Machines Corporation").with_aliases(["IBM"]),
            CandidateEntity::new("aapl", "Apple Inc."),
        ]))
    }

    fn app_with(source: Arc<dyn CandidateSource>, config: ServerConfig) -> Router {
        let service = MatchingService::new(MatcherConfig::default(), source, None, create_shared_cache(5));
        build_router(AppState::new(service, config))
    }

    fn app() -> Router {
        app_with(catalog(), ServerConfig::default())
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_match_endpoint() {
        let response = app()
            .oneshot(post("/match", json!({"companyName": "IBM", "debug": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "match");
        assert_eq!(body["match"]["entity"]["id"], "ibm");
        assert_eq!(body["match"]["matchType"], "abbreviation");
        assert_eq!(body["debug"]["aiCalls"], 0);
        assert!(body["requestId"].as_str().map_or(false, |id| !id.is_empty()));
    }

    #[tokio::test]
    async fn test_match_validation_errors() {
        let response = app()
            .oneshot(post("/match", json!({"companyName": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "validation_error");
        assert!(body["requestId"].is_string());

        let response = app()
            .oneshot(post("/match", json!({"name": "IBM"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app()
            .oneshot(post(
                "/match",
                json!({"companyName": "IBM", "context": {"favouriteColour": "blue"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_source_outage_is_503() {
        let app = app_with(Arc::new(DownSource), ServerConfig::default());
        let response = app
            .oneshot(post("/match", json!({"companyName": "Acme Widgets"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "candidate_source_unavailable");
    }

    #[tokio::test]
    async fn test_batch_endpoint() {
        let response = app()
            .oneshot(post(
                "/batch",
                json!({"companies": ["IBM", {"companyName": ""}, {"companyName": "Aple"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["processed"], 3);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results[0]["index"], 0);
        assert_eq!(results[0]["status"], "match");
        assert_eq!(results[1]["status"], "error");
        assert_eq!(results[1]["error"], "validation_error");
        assert_eq!(results[2]["companyName"], "Aple");
        assert_eq!(results[2]["match"]["entity"]["id"], "aapl");

        let batch_id = body["requestId"].as_str().unwrap();
        for (index, item) in results.iter().enumerate() {
            assert_eq!(item["requestId"], format!("{}-{}", batch_id, index));
        }
    }

    #[tokio::test]
    async fn test_batch_size_limits() {
        let response = app()
            .oneshot(post("/batch", json!({"companies": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let names: Vec<String> = (0..101).map(|i| format!("Company {}", i)).collect();
        let response = app()
            .oneshot(post("/batch", json!({"companies": names})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_status() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"]["candidateSource"]["status"], "up");
        assert_eq!(body["services"]["ai"]["status"], "disabled");

        let degraded_config = ServerConfig {
            ai_enabled: true,
            ..ServerConfig::default()
        };
        let response = app_with(catalog(), degraded_config)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "degraded");

        let response = app_with(Arc::new(DownSource), ServerConfig::default())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let config = ServerConfig {
            api_keys: vec!["secret".to_string()],
            ..ServerConfig::default()
        };

        let response = app_with(catalog(), config.clone())
            .oneshot(post("/match", json!({"companyName": "IBM"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "unauthorized");

        let mut request = post("/match", json!({"companyName": "IBM"}));
        request
            .headers_mut()
            .insert("x-api-key", header::HeaderValue::from_static("secret"));
        let response = app_with(catalog(), config.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app_with(catalog(), config)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_returns_retry_after() {
        let config = ServerConfig {
            rate_limit_per_minute: 1,
            ..ServerConfig::default()
        };
        let app = app_with(catalog(), config);

        let first = app
            .clone()
            .oneshot(post("/match", json!({"companyName": "IBM"})))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post("/match", json!({"companyName": "IBM"})))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
        let body = body_json(second).await;
        assert_eq!(body["error"], "rate_limit_exceeded");
        assert!(body["retryAfter"].as_u64().map_or(false, |s| s >= 1));
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_shares_one_limit() {
        let config = ServerConfig {
            rate_limit_per_minute: 1,
            ..ServerConfig::default()
        };
        let app = app_with(catalog(), config);

        let mut statuses = Vec::new();
        for ip in ["203.0.113.1", "203.0.113.2"] {
            let mut request = post("/match", json!({"companyName": "IBM"}));
            request
                .headers_mut()
                .insert("x-forwarded-for", ip.parse().unwrap());
            let response = app.clone().oneshot(request).await.unwrap();
            statuses.push(response.status());
        }
        assert_eq!(statuses, vec![StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);
    }
}
