//! Normalized model output.

use serde::{Deserialize, Serialize};

/// A model claim pointing at a specific place in the repository.
///
/// Claims are never trusted as-is; the verification engine re-fetches the
/// file at the commit and confirms line and match before gating counts the
/// claim as verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceClaim {
    pub file: String,
    pub line: Option<u64>,
    #[serde(rename = "match")]
    pub matched: Option<String>,
}

/// Normalized analysis of one event, whether model-produced or derived
/// deterministically from evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub stage: String,
    pub root_cause: String,
    pub suggested_fix: String,
    /// Always clamped into [0,1]
    pub confidence: f64,
    pub explain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<EvidenceClaim>,
}

impl AnalysisResult {
    /// Root cause when the model could not be reached or never produced
    /// usable output.
    pub const AI_UNAVAILABLE: &'static str = "AI_UNAVAILABLE";

    /// Root cause the model is instructed to answer when nothing in the
    /// supplied context supports a conclusion.
    pub const INSUFFICIENT_EVIDENCE: &'static str = "INSUFFICIENT_EVIDENCE";

    /// Deterministic classification for a verified secret hit.
    pub const HARD_CODED_SECRET: &'static str = "HARD_CODED_SECRET";

    /// Deterministic classification for a high-bucket dependency finding.
    pub const DEPENDENCY_VULNERABILITY: &'static str = "DEPENDENCY_VULNERABILITY";

    /// Confidence assigned to deterministic classifications.
    pub const DETERMINISTIC_CONFIDENCE: f64 = 0.99;

    /// A structured zero-confidence result standing in for model output.
    pub fn fallback(root_cause: &str, stage: &str, explain: String) -> Self {
        Self {
            stage: stage.to_string(),
            root_cause: root_cause.to_string(),
            suggested_fix: String::new(),
            confidence: 0.0,
            explain,
            claim: None,
        }
    }

    /// A deterministic classification produced without the model.
    pub fn deterministic(root_cause: &str, stage: &str, explain: String) -> Self {
        Self {
            stage: stage.to_string(),
            root_cause: root_cause.to_string(),
            suggested_fix: String::new(),
            confidence: Self::DETERMINISTIC_CONFIDENCE,
            explain,
            claim: None,
        }
    }
}

/// Clamp a reported confidence into [0,1]. NaN collapses to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_clamps_into_unit_interval() {
        assert_eq!(clamp_confidence(1.5), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(0.73), 0.73);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn fallback_carries_zero_confidence_and_the_reason() {
        let result = AnalysisResult::fallback(
            AnalysisResult::AI_UNAVAILABLE,
            "test",
            "model endpoint unreachable".into(),
        );
        assert_eq!(result.root_cause, "AI_UNAVAILABLE");
        assert_eq!(result.confidence, 0.0);
        assert!(result.explain.contains("unreachable"));
        assert!(result.claim.is_none());
    }

    #[test]
    fn deterministic_results_carry_the_fixed_high_confidence() {
        let secret = AnalysisResult::deterministic(
            AnalysisResult::HARD_CODED_SECRET,
            "build",
            "verified secret in src/settings.py".into(),
        );
        assert_eq!(secret.confidence, 0.99);
        assert_eq!(secret.root_cause, "HARD_CODED_SECRET");
        assert!(secret.claim.is_none());
    }
}
