// src/api/dto.rs - JSON request and response bodies
use serde::{Deserialize, Serialize};

use crate::errors::MatchError;
use crate::matching::orchestrator::batch_entry_id;
use crate::models::{DebugTrace, MatchContext, MatchOutcome, MatchQuery, MatchResult, QueryOptions, ScoredCandidate};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub company_name: String,
    #[serde(default)]
    pub context: Option<MatchContext>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub skip_cache: bool,
}

impl MatchRequest {
    pub fn into_query(self) -> MatchQuery {
        let query = MatchQuery::new(self.company_name).with_options(QueryOptions {
            debug: self.debug,
            skip_cache: self.skip_cache,
            model: self.model,
        });
        match self.context {
            Some(context) => query.with_context(context),
            None => query,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompany {
    pub company_name: String,
    #[serde(default)]
    pub context: Option<MatchContext>,
}

/// A batch entry is either a bare name or `{companyName, context?}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Name(String),
    Detailed(BatchCompany),
}

impl BatchEntry {
    pub fn company_name(&self) -> &str {
        match self {
            BatchEntry::Name(name) => name,
            BatchEntry::Detailed(company) => &company.company_name,
        }
    }

    pub fn to_query(&self, model: Option<&str>) -> MatchQuery {
        let (name, context) = match self {
            BatchEntry::Name(name) => (name.clone(), None),
            BatchEntry::Detailed(company) => (company.company_name.clone(), company.context.clone()),
        };
        let query = MatchQuery::new(name).with_options(QueryOptions {
            model: model.map(str::to_string),
            ..QueryOptions::default()
        });
        match context {
            Some(context) => query.with_context(context),
            None => query,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub companies: Vec<BatchEntry>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub success: bool,
    pub request_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#match: Option<ScoredCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_matches: Option<Vec<ScoredCandidate>>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugTrace>,
}

fn split_result(result: MatchResult) -> (&'static str, Option<ScoredCandidate>, Option<Vec<ScoredCandidate>>) {
    let status = result.status();
    match result {
        MatchResult::Match(best) => (status, Some(best), None),
        MatchResult::PotentialMatches(list) => (status, None, Some(list)),
        MatchResult::NoMatch => (status, None, None),
    }
}

impl MatchResponse {
    pub fn from_outcome(request_id: String, outcome: MatchOutcome) -> Self {
        let (status, best, potential) = split_result(outcome.result);
        Self {
            success: true,
            request_id,
            status,
            r#match: best,
            potential_matches: potential,
            from_cache: outcome.from_cache,
            debug: outcome.debug,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub index: usize,
    /// `{batch requestId}-{index}`, as used in the service logs.
    pub request_id: String,
    pub company_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#match: Option<ScoredCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_matches: Option<Vec<ScoredCandidate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchItem {
    pub fn from_result(
        batch_id: &str,
        index: usize,
        company_name: &str,
        result: Result<MatchOutcome, MatchError>,
    ) -> Self {
        let request_id = batch_entry_id(batch_id, index);
        match result {
            Ok(outcome) => {
                let (status, best, potential) = split_result(outcome.result);
                Self {
                    index,
                    request_id,
                    company_name: company_name.to_string(),
                    status,
                    r#match: best,
                    potential_matches: potential,
                    error: None,
                    message: None,
                }
            }
            Err(e) => Self {
                index,
                request_id,
                company_name: company_name.to_string(),
                status: "error",
                r#match: None,
                potential_matches: None,
                error: Some(e.code()),
                message: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success: bool,
    pub request_id: String,
    pub results: Vec<BatchItem>,
    pub processed: usize,
    /// Milliseconds.
    pub duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_entries_accept_both_shapes() {
        let request: BatchRequest = serde_json::from_value(json!({
            "companies": ["IBM", {"companyName": "Apple", "context": {"industry": "Technology"}}],
            "model": "llama3.2"
        }))
        .unwrap();
        assert_eq!(request.companies.len(), 2);
        assert_eq!(request.companies[0].company_name(), "IBM");

        let query = request.companies[1].to_query(request.model.as_deref());
        assert_eq!(query.raw_name, "Apple");
        assert_eq!(query.options.model.as_deref(), Some("llama3.2"));
        assert_eq!(
            query.context.and_then(|c| c.industry).as_deref(),
            Some("Technology")
        );
    }

    #[test]
    fn test_unknown_context_fields_are_rejected() {
        let parsed: Result<MatchRequest, _> = serde_json::from_value(json!({
            "companyName": "Apple",
            "context": {"industry": "Technology", "ceo": "someone"}
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_error_items_carry_code() {
        let item = BatchItem::from_result(
            "b1",
            2,
            "Acme",
            Err(MatchError::CandidateSourceUnavailable("down".to_string())),
        );
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "candidate_source_unavailable");
        assert_eq!(value["companyName"], "Acme");
        assert_eq!(value["requestId"], "b1-2");
        assert!(value.get("match").is_none());
    }
}
