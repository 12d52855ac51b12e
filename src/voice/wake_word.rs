//! Wake word matching
//!
//! Matching is a case-insensitive leftmost substring search, with whatever
//! trails the phrase extracted as an inline command. "hey solus what's the
//! weather" both wakes the assistant and carries the command, skipping the
//! separate command-capture pass.

/// Result of matching a transcript against the wake phrase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeWordMatch {
    /// Text following the wake phrase, if any words trail it
    pub trailing_command: Option<String>,
}

/// Matches transcripts against a configured wake phrase
#[derive(Debug, Clone)]
pub struct WakeWordMatcher {
    phrase: String,
}

impl WakeWordMatcher {
    /// Create a matcher for `phrase` (case-insensitive)
    #[must_use]
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: phrase.trim().to_lowercase(),
        }
    }

    /// The phrase being matched, lowercased
    #[must_use]
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Check `transcript` for the wake phrase
    ///
    /// Returns the leftmost match. Text after the phrase, trimmed of
    /// whitespace and leading punctuation, becomes the trailing command;
    /// a bare wake phrase yields `trailing_command: None`.
    #[must_use]
    pub fn match_transcript(&self, transcript: &str) -> Option<WakeWordMatch> {
        if self.phrase.is_empty() {
            return None;
        }

        let lowered = transcript.to_lowercase();
        let start = lowered.find(&self.phrase)?;
        // Lowercasing can shift byte offsets for non-ASCII text; fall back
        // to the lowered transcript when the original cannot be sliced
        let rest_start = start + self.phrase.len();
        let rest = if transcript.len() == lowered.len() && transcript.is_char_boundary(rest_start) {
            &transcript[rest_start..]
        } else {
            &lowered[rest_start..]
        };
        let rest = rest
            .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
            .trim();

        Some(WakeWordMatch {
            trailing_command: if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_phrase_matches_without_command() {
        let matcher = WakeWordMatcher::new("hey solus");
        let m = matcher.match_transcript("hey solus").expect("match");
        assert_eq!(m.trailing_command, None);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let matcher = WakeWordMatcher::new("hey solus");
        assert!(matcher.match_transcript("HEY SOLUS").is_some());
        assert!(matcher.match_transcript("Hey Solus, lights on").is_some());
    }

    #[test]
    fn trailing_text_becomes_command() {
        let matcher = WakeWordMatcher::new("hey solus");
        let m = matcher
            .match_transcript("hey solus what's the weather")
            .expect("match");
        assert_eq!(m.trailing_command.as_deref(), Some("what's the weather"));
    }

    #[test]
    fn leading_text_is_ignored() {
        let matcher = WakeWordMatcher::new("hey solus");
        let m = matcher
            .match_transcript("i said hey solus turn off the lights")
            .expect("match");
        assert_eq!(m.trailing_command.as_deref(), Some("turn off the lights"));
    }

    #[test]
    fn leftmost_occurrence_wins() {
        let matcher = WakeWordMatcher::new("hey solus");
        let m = matcher
            .match_transcript("hey solus say hey solus back")
            .expect("match");
        assert_eq!(m.trailing_command.as_deref(), Some("say hey solus back"));
    }

    #[test]
    fn no_match_without_phrase() {
        let matcher = WakeWordMatcher::new("hey solus");
        assert!(matcher.match_transcript("turn off the lights").is_none());
        assert!(matcher.match_transcript("").is_none());
    }

    #[test]
    fn punctuation_after_phrase_is_stripped() {
        let matcher = WakeWordMatcher::new("hey solus");
        let m = matcher
            .match_transcript("hey solus, add milk to my list")
            .expect("match");
        assert_eq!(m.trailing_command.as_deref(), Some("add milk to my list"));
    }

    #[test]
    fn empty_phrase_never_matches() {
        let matcher = WakeWordMatcher::new("   ");
        assert!(matcher.match_transcript("anything").is_none());
    }
}
