// src/matching/escalation.rs - Decides when an uncertain result is worth an AI call
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationDecision {
    Skip,
    Invoke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Confident enough to accept without help.
    Settled,
    /// Inside the designed uncertainty band.
    UncertaintyBand,
    /// Below the band but ambiguous or backed by caller context.
    AmbiguousOrContextual,
    /// Too weak for the AI to rescue.
    TooWeak,
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EscalationReason::Settled => "settled match",
            EscalationReason::UncertaintyBand => "uncertainty band",
            EscalationReason::AmbiguousOrContextual => "ambiguous or contextual",
            EscalationReason::TooWeak => "too weak",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateThresholds {
    pub low: f64,
    pub ai_min: f64,
    pub ai_min_with_context: f64,
    pub ai_max: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            low: 0.3,
            ai_min: 0.7,
            ai_min_with_context: 0.6,
            ai_max: 0.95,
        }
    }
}

impl GateThresholds {
    pub fn ai_min_for(&self, has_user_context: bool) -> f64 {
        if has_user_context {
            self.ai_min_with_context
        } else {
            self.ai_min
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateInput {
    pub top_confidence: f64,
    pub has_ambiguity: bool,
    pub has_user_context: bool,
}

/// The escalation rule. Total and side-effect free.
pub fn evaluate(input: &GateInput, thresholds: &GateThresholds) -> (EscalationDecision, EscalationReason) {
    let top = input.top_confidence;
    let ai_min = thresholds.ai_min_for(input.has_user_context);

    if top >= thresholds.ai_max {
        (EscalationDecision::Skip, EscalationReason::Settled)
    } else if top >= ai_min {
        (EscalationDecision::Invoke, EscalationReason::UncertaintyBand)
    } else if top >= thresholds.low && (input.has_ambiguity || input.has_user_context) {
        (EscalationDecision::Invoke, EscalationReason::AmbiguousOrContextual)
    } else {
        (EscalationDecision::Skip, EscalationReason::TooWeak)
    }
}
