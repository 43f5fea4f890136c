// src/lib.rs
pub mod ai;
pub mod api;
pub mod cache;
pub mod errors;
pub mod matching;
pub mod models;
pub mod sources;
pub mod utils;

pub use matching::MatchingService;
