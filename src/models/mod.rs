// src/models/mod.rs
pub mod core;
pub mod matching;

pub use self::core::{CandidateEntity, MatchContext, MatchQuery, QueryOptions};
pub use self::matching::{
    CallKind, CallOutcome, CallTiming, DebugTrace, MatchOutcome, MatchResult, MatchType,
    ScoredCandidate, TokenUsage,
};
