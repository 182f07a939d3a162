//! Danger-phrase detection for consult messages
//!
//! Matching is an exact, case-sensitive substring test against the raw message
//! text. No case folding, Unicode normalization or word-boundary logic is
//! applied, so the phrase list must contain every spelling it should catch.

use crate::config::DEFAULT_DANGER_PHRASES;

/// Tests free text against a fixed phrase list
#[derive(Debug, Clone)]
pub struct LexiconMatcher {
    phrases: Vec<String>,
}

impl Default for LexiconMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DANGER_PHRASES.iter().copied())
    }
}

impl LexiconMatcher {
    /// Build a matcher. Empty phrases are dropped: they would match every text.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let phrases = phrases
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// True iff any phrase occurs in `text`
    pub fn matches(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    /// First phrase (in list order) found in `text`
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.phrases
            .iter()
            .find(|phrase| text.contains(phrase.as_str()))
            .map(String::as_str)
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_substring() {
        let lexicon = LexiconMatcher::default();
        assert!(lexicon.matches("最近ほんとうに死にたいと思う"));
        assert!(lexicon.matches("i just want to disappear for a while"));
        assert!(!lexicon.matches("テストが不安です"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let lexicon = LexiconMatcher::new(["help me"]);
        assert!(lexicon.matches("please help me"));
        assert!(!lexicon.matches("Please HELP ME"));
    }

    #[test]
    fn test_empty_phrases_are_ignored() {
        let lexicon = LexiconMatcher::new(["", "suicide"]);
        assert_eq!(lexicon.phrases().len(), 1);
        assert!(!lexicon.matches("anything at all"));
    }

    #[test]
    fn test_first_match_follows_list_order() {
        let lexicon = LexiconMatcher::new(["help", "help me"]);
        assert_eq!(lexicon.first_match("help me"), Some("help"));
    }
}
