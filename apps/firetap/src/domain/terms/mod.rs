//! Watch Terms
//!
//! The fixed set of strings a session watches for in incoming records, and
//! the matching rule that annotates each record with the subset it contains.
//!
//! # Matching Rules
//!
//! - Case-insensitive substring containment.
//! - Matches are reported in the order the terms were supplied, which keeps
//!   annotations reproducible across runs.
//! - A term list with duplicates reports duplicate matches; the matcher never
//!   deduplicates beyond what the input contains.

/// Delimiter used to join terms into the upstream filter parameter.
pub const TERM_DELIMITER: char = ',';

/// An ordered, immutable set of watch terms for one streaming session.
///
/// Construction lower-cases each term once so per-record matching only pays
/// for lower-casing the record text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTerms {
    terms: Vec<String>,
    lowered: Vec<String>,
}

impl WatchTerms {
    /// Create a new term set, preserving the supplied order.
    #[must_use]
    pub fn new(terms: Vec<String>) -> Self {
        let lowered = terms.iter().map(|t| t.to_lowercase()).collect();
        Self { terms, lowered }
    }

    /// Return the terms present in `text`, in original term order.
    ///
    /// Containment is case-insensitive substring matching. The result is an
    /// empty vec when nothing matches; matching never fails.
    #[must_use]
    pub fn matches(&self, text: &str) -> Vec<String> {
        let lowered_text = text.to_lowercase();
        self.terms
            .iter()
            .zip(&self.lowered)
            .filter(|(_, lowered)| lowered_text.contains(lowered.as_str()))
            .map(|(term, _)| term.clone())
            .collect()
    }

    /// Join the terms into the single upstream filter parameter value.
    #[must_use]
    pub fn joined(&self) -> String {
        self.terms.join(&TERM_DELIMITER.to_string())
    }

    /// Number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The terms in supplied order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.terms
    }
}

impl From<Vec<String>> for WatchTerms {
    fn from(terms: Vec<String>) -> Self {
        Self::new(terms)
    }
}

impl<S: Into<String>> FromIterator<S> for WatchTerms {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}
