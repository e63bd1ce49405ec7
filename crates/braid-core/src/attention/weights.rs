//! Attention Blend Weights
//!
//! The five named factors of the attention score, plus per-kind category
//! priors. Weights must sum to 1 so scores stay comparable across
//! configurations.

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::record::RecordKind;

/// Weights of the attention blend. Overridable via `ATTENTION_WEIGHTS`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttentionWeights {
    pub similarity: f64,
    pub epistemic_tier: f64,
    pub freshness: f64,
    pub conflict: f64,
    pub category: f64,
}

impl Default for AttentionWeights {
    fn default() -> Self {
        Self {
            similarity: 0.45,
            epistemic_tier: 0.20,
            freshness: 0.15,
            conflict: 0.10,
            category: 0.10,
        }
    }
}

impl AttentionWeights {
    /// Weights must be non-negative and sum to 1.
    pub fn validate(&self) -> Result<()> {
        let parts = [
            self.similarity,
            self.epistemic_tier,
            self.freshness,
            self.conflict,
            self.category,
        ];
        if parts.iter().any(|w| *w < 0.0) {
            return Err(MemoryError::InvalidArgument(
                "attention weights must be non-negative".to_string(),
            ));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(MemoryError::InvalidArgument(format!(
                "attention weights must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Per-kind category priors. A record carrying several kinds takes the
/// maximum applicable boost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryBoosts {
    pub decision: f64,
    pub thread: f64,
    pub priming: f64,
    pub pattern: f64,
    pub flag: f64,
    pub message: f64,
}

impl Default for CategoryBoosts {
    fn default() -> Self {
        Self {
            decision: 1.0,
            thread: 0.8,
            priming: 0.6,
            pattern: 0.5,
            flag: 0.4,
            message: 0.3,
        }
    }
}

impl CategoryBoosts {
    pub fn boost(&self, kind: RecordKind) -> f64 {
        match kind {
            RecordKind::Decision => self.decision,
            RecordKind::Thread => self.thread,
            RecordKind::Priming => self.priming,
            RecordKind::Pattern => self.pattern,
            RecordKind::Flag => self.flag,
            RecordKind::Message => self.message,
        }
    }

    /// Maximum boost across every kind a record belongs to.
    pub fn boost_max(&self, kinds: &[RecordKind]) -> f64 {
        kinds
            .iter()
            .map(|k| self.boost(*k))
            .fold(0.0, f64::max)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!(AttentionWeights::default().validate().is_ok());
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let mut weights = AttentionWeights::default();
        weights.similarity = 0.9;
        assert_eq!(weights.validate().unwrap_err().kind(), "invalid_argument");

        let mut negative = AttentionWeights::default();
        negative.conflict = -0.1;
        negative.similarity = 0.65;
        assert_eq!(negative.validate().unwrap_err().kind(), "invalid_argument");
    }

    #[test]
    fn serde_uses_camel_case_with_defaults() {
        let weights: AttentionWeights =
            serde_json::from_str(r#"{"similarity":0.5,"epistemicTier":0.15}"#).unwrap();
        assert!((weights.similarity - 0.5).abs() < f64::EPSILON);
        assert!((weights.epistemic_tier - 0.15).abs() < f64::EPSILON);
        // Unspecified fields keep their defaults.
        assert!((weights.freshness - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn category_boosts_follow_the_prior_ladder() {
        let boosts = CategoryBoosts::default();
        assert!(boosts.boost(RecordKind::Decision) > boosts.boost(RecordKind::Thread));
        assert!(boosts.boost(RecordKind::Thread) > boosts.boost(RecordKind::Priming));
        assert!(boosts.boost(RecordKind::Flag) > boosts.boost(RecordKind::Message));
    }

    #[test]
    fn multi_kind_records_take_the_maximum_boost() {
        let boosts = CategoryBoosts::default();
        let max = boosts.boost_max(&[RecordKind::Message, RecordKind::Decision]);
        assert!((max - 1.0).abs() < f64::EPSILON);
        assert_eq!(boosts.boost_max(&[]), 0.0);
    }
}
