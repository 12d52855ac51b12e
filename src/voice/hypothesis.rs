//! Recognition hypothesis parsing
//!
//! Recognizers report results as JSON documents in one of two shapes:
//! `{"partial": "..."}` for in-progress decoding and `{"text": "..."}` for a
//! finalized utterance. Malformed payloads degrade to an empty final rather
//! than an error so one bad message never stalls a listening loop.

use serde::Deserialize;

/// A single recognition result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionHypothesis {
    /// Recognized text, trimmed; may be empty
    pub text: String,
    /// Whether the recognizer finalized this utterance
    pub is_final: bool,
}

impl RecognitionHypothesis {
    /// A final hypothesis
    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: normalize(&text.into()),
            is_final: true,
        }
    }

    /// A partial (in-progress) hypothesis
    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: normalize(&text.into()),
            is_final: false,
        }
    }

    /// Parse a recognizer result document
    ///
    /// A document carrying a `text` field is final, one carrying only
    /// `partial` is not. Anything unparseable becomes an empty final.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        #[derive(Deserialize)]
        struct Raw {
            text: Option<String>,
            partial: Option<String>,
        }

        match serde_json::from_str::<Raw>(raw) {
            Ok(Raw {
                text: Some(text), ..
            }) => Self::final_text(text),
            Ok(Raw {
                partial: Some(partial),
                ..
            }) => Self::partial(partial),
            Ok(_) | Err(_) => Self::final_text(""),
        }
    }

    /// Pick the best candidate from a ranked alternatives list
    ///
    /// The first non-empty candidate wins; an empty list (or all-empty
    /// candidates) yields `None`. Always final, since recognizers only rank
    /// finished utterances.
    #[must_use]
    pub fn from_alternatives<'a, I>(alternatives: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        alternatives
            .into_iter()
            .map(Self::final_text)
            .find(|h| !h.is_empty())
    }

    /// Whether this hypothesis carries any recognized words
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Collapse whitespace runs and trim
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
