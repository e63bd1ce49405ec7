//! Two-Signal Conflict Detection
//!
//! Two decisions conflict only when they are semantically close AND
//! diverge in intent: shared salient subject matter with a negation or
//! opposite-modal marker on exactly one side. Paraphrases share subject
//! matter without the asymmetry and are never conflicts.
//!
//! The detector is pure: no I/O, no mutation, deterministic. The registry
//! feeds it neighbor pairs; recall reuses it when explaining rankings.

use std::collections::BTreeSet;

/// Cosine floor below which two texts are not even candidates.
pub const SEMANTIC_PROXIMITY_FLOOR: f32 = 0.72;

/// Minimum salient-token overlap (intersection over union) for the
/// divergence signal.
pub const SUBJECT_OVERLAP_FLOOR: f64 = 0.5;

/// Markers whose one-sided presence signals an opposing position.
const OPPOSITION_MARKERS: &[&str] = &[
    "not", "no", "never", "rejected", "reject", "superseded", "supersede",
    "instead", "avoid", "drop", "dropped", "stop", "abandon", "abandoned",
    "against", "wont", "cant", "shouldnt", "dont",
];

/// Outcome of a two-signal check, with both signals decomposed so callers
/// can explain the verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConflictVerdict {
    /// Signal 1: cosine proximity passed the floor.
    pub semantic: bool,
    /// Salient-token intersection over union.
    pub subject_overlap: f64,
    /// Signal 2: shared subject with marker asymmetry.
    pub divergent: bool,
}

impl ConflictVerdict {
    /// A conflict requires both signals.
    pub fn is_conflict(&self) -> bool {
        self.semantic && self.divergent
    }
}

/// The two-signal conflict detector.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    pub similarity_floor: f32,
    pub overlap_floor: f64,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self {
            similarity_floor: SEMANTIC_PROXIMITY_FLOOR,
            overlap_floor: SUBJECT_OVERLAP_FLOOR,
        }
    }
}

impl ConflictDetector {
    /// Judge a candidate pair given their texts and embedding cosine.
    pub fn judge(&self, a: &str, b: &str, cosine: f32) -> ConflictVerdict {
        let semantic = cosine >= self.similarity_floor;

        let salient_a = salient_tokens(a);
        let salient_b = salient_tokens(b);
        let subject_overlap = jaccard(&salient_a, &salient_b);
        let same_subject = subject_overlap >= self.overlap_floor;

        let divergent = same_subject && opposition_asymmetry(a, b);

        ConflictVerdict { semantic, subject_overlap, divergent }
    }
}

/// Salient tokens: acronyms and mixed-case identifiers (uppercase beyond
/// the first character), digit-bearing tokens, quoted spans, and
/// capitalized words that are not sentence-initial. Lowercased for
/// comparison.
fn salient_tokens(text: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();

    for quoted in quoted_spans(text) {
        for word in split_words(&quoted) {
            tokens.insert(word.to_lowercase());
        }
    }

    for (index, word) in split_words(text).into_iter().enumerate() {
        let mut chars = word.chars();
        let first_upper = chars.next().is_some_and(|c| c.is_uppercase());
        let later_upper = word.chars().skip(1).any(|c| c.is_uppercase());
        let has_digit = word.chars().any(|c| c.is_ascii_digit());

        let salient = later_upper || has_digit || (first_upper && index > 0);
        if salient {
            tokens.insert(word.to_lowercase());
        }
    }

    tokens
}

fn split_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn quoted_spans(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    for quote in ['"', '\''] {
        let segments: Vec<&str> = text.split(quote).collect();
        // Odd segments sit between quote pairs; a trailing odd segment has
        // no closing quote (apostrophes land here) and is skipped.
        let mut i = 1;
        while i + 1 < segments.len() {
            spans.push(segments[i].to_string());
            i += 2;
        }
    }
    spans
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// True when exactly one of the two texts carries an opposition marker.
fn opposition_asymmetry(a: &str, b: &str) -> bool {
    has_opposition_marker(a) != has_opposition_marker(b)
}

fn has_opposition_marker(text: &str) -> bool {
    // Contractions survive tokenization poorly, so catch them on the raw text.
    if text.to_lowercase().contains("n't") {
        return true;
    }
    split_words(text)
        .iter()
        .any(|word| OPPOSITION_MARKERS.contains(&word.to_lowercase().as_str()))
}

// ============================================================================
// TESTS
// ============================================================================
