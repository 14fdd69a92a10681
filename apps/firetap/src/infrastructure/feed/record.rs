//! Stream Records
//!
//! The decoded shape of one upstream record and its watch-term annotation.

use serde::Deserialize;

use crate::domain::terms::WatchTerms;

/// One record from the filtered stream.
///
/// Decoded from a single JSON line; unknown fields are ignored and a missing
/// `text` field decodes as empty (the upstream interleaves occasional
/// control objects that carry no text). `matched_terms` is never read from
/// the wire; it is filled by [`Record::annotated`] after decode. Immutable
/// once annotated; ownership moves to the consumer on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Record {
    /// Record text as sent by the upstream feed.
    #[serde(default)]
    pub text: String,

    /// Watch terms found in `text`, in watch-term order.
    #[serde(skip)]
    pub matched_terms: Vec<String>,
}

impl Record {
    /// Decode one record from a JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a valid JSON object.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Fill `matched_terms` with the watch terms found in the text.
    #[must_use]
    pub fn annotated(mut self, terms: &WatchTerms) -> Self {
        self.matched_terms = terms.matches(&self.text);
        self
    }
}
