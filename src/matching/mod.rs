// src/matching/mod.rs
pub mod confidence;
pub mod escalation;
pub mod normalize;
pub mod orchestrator;
pub mod phonetic;
pub mod rewrite;
pub mod rules;
pub mod typo;

pub use orchestrator::MatchingService;
