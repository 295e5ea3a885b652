//! Transcript reconciliation
//!
//! Each new hypothesis replaces the previous one wholesale, but the text is
//! already sitting in someone else's input field. Retyping everything on every
//! pass would flicker badly, so we compute the smallest trailing rewrite:
//! delete back to the longest common prefix, then append the rest.
//!
//! The common prefix doubles as a stability boundary. Once a prefix has
//! matched between what was injected and a hypothesis, that prefix is locked:
//! a later hypothesis that disagrees inside the locked region cannot rewind
//! it. The boundary never decreases within a session, which keeps settled
//! text from churning when the recognizer briefly second-guesses itself.

use crate::transcribe::Hypothesis;

/// A trailing rewrite of the injected text: remove `delete` characters from
/// the end, then type `append`. Counts are characters, not bytes, because
/// each backspace removes one character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub delete: usize,
    pub append: String,
}

impl Edit {
    pub fn none() -> Self {
        Self {
            delete: 0,
            append: String::new(),
        }
    }

    /// An empty edit must cost zero OS calls at the injector
    pub fn is_noop(&self) -> bool {
        self.delete == 0 && self.append.is_empty()
    }
}

/// Reconciles successive hypotheses with the text already injected.
///
/// One instance per recording session; drops with the session.
#[derive(Debug, Default)]
pub struct StabilityDiff {
    /// What the target application currently shows (as far as we caused it)
    injected: String,
    /// Number of leading characters locked against revision
    boundary: usize,
    /// Set once a final hypothesis has been applied
    sealed: bool,
}

impl StabilityDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn injected_text(&self) -> &str {
        &self.injected
    }

    pub fn boundary(&self) -> usize {
        self.boundary
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Compute the edit that reconciles the injected text with `hypothesis`,
    /// and account for it as applied.
    ///
    /// After a final hypothesis the session is sealed and every further call
    /// returns an empty edit.
    pub fn reconcile(&mut self, hypothesis: &Hypothesis) -> Edit {
        if self.sealed {
            return Edit::none();
        }

        let injected_len = self.injected.chars().count();
        let matched = common_prefix_chars(&self.injected, &hypothesis.text);

        // Locked text is kept even when the new hypothesis disagrees with it;
        // only the tail from the boundary onward is up for revision.
        let keep = matched.max(self.boundary);

        let delete = injected_len - keep;
        let append: String = hypothesis.text.chars().skip(keep).collect();

        self.injected.truncate(char_offset(&self.injected, keep));
        self.injected.push_str(&append);
        self.boundary = self.boundary.max(matched);

        if hypothesis.is_final {
            self.sealed = true;
        }

        Edit { delete, append }
    }
}

/// Length in characters of the longest common prefix of two strings
fn common_prefix_chars(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Byte offset of the `n`-th character (saturating at the string end)
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(text: &str) -> Hypothesis {
        Hypothesis::partial(text)
    }

    /// Replay a sequence of edits against an initially empty string
    fn replay(edits: &[Edit]) -> String {
        let mut text = String::new();
        for edit in edits {
            let keep = text.chars().count() - edit.delete;
            text.truncate(char_offset(&text, keep));
            text.push_str(&edit.append);
        }
        text
    }

    #[test]
    fn test_growing_utterance() {
        // Scenario: "he" -> "hello" -> "hello there"
        let mut diff = StabilityDiff::new();

        let e1 = diff.reconcile(&partial("he"));
        assert_eq!(e1, Edit { delete: 0, append: "he".to_string() });

        let e2 = diff.reconcile(&partial("hello"));
        assert_eq!(e2, Edit { delete: 0, append: "llo".to_string() });

        let e3 = diff.reconcile(&partial("hello there"));
        assert_eq!(e3, Edit { delete: 0, append: " there".to_string() });

        assert_eq!(diff.injected_text(), "hello there");
    }

    #[test]
    fn test_correction() {
        // Scenario: "hello" -> "helly"
        let mut diff = StabilityDiff::new();

        let e1 = diff.reconcile(&partial("hello"));
        assert_eq!(e1, Edit { delete: 0, append: "hello".to_string() });

        let e2 = diff.reconcile(&partial("helly"));
        assert_eq!(e2, Edit { delete: 1, append: "y".to_string() });

        assert_eq!(diff.injected_text(), "helly");
    }

    #[test]
    fn test_recognizer_revises_to_nothing() {
        // Scenario: empty hypothesis after a non-empty one deletes everything
        let mut diff = StabilityDiff::new();

        diff.reconcile(&partial("hello"));
        let e = diff.reconcile(&partial(""));
        assert_eq!(e, Edit { delete: 5, append: String::new() });
        assert_eq!(diff.injected_text(), "");
    }

    #[test]
    fn test_identical_hypothesis_is_noop() {
        let mut diff = StabilityDiff::new();

        diff.reconcile(&partial("same text"));
        let e = diff.reconcile(&partial("same text"));
        assert!(e.is_noop());
        assert_eq!(diff.injected_text(), "same text");
    }

    #[test]
    fn test_boundary_is_monotone() {
        let mut diff = StabilityDiff::new();

        diff.reconcile(&partial("hello world"));
        assert_eq!(diff.boundary(), 0); // nothing matched an empty field

        diff.reconcile(&partial("hello there"));
        assert_eq!(diff.boundary(), 6); // "hello " re-matched, now locked

        let mut last = diff.boundary();
        for text in ["hello they", "hello the", "hellish", "hello everyone"] {
            diff.reconcile(&partial(text));
            assert!(diff.boundary() >= last, "boundary decreased on {:?}", text);
            last = diff.boundary();
        }
    }

    #[test]
    fn test_locked_prefix_survives_disagreement() {
        let mut diff = StabilityDiff::new();

        diff.reconcile(&partial("hello world"));
        diff.reconcile(&partial("hello worlds")); // locks "hello world"

        // A hypothesis that rewrites the locked region cannot rewind past it
        let e = diff.reconcile(&partial("jello worlds"));
        assert!(e.delete <= 1);
        assert!(diff.injected_text().starts_with("hello world"));
    }

    #[test]
    fn test_empty_hypothesis_respects_lock() {
        let mut diff = StabilityDiff::new();

        diff.reconcile(&partial("stay"));
        diff.reconcile(&partial("stay put")); // locks "stay"

        let e = diff.reconcile(&partial(""));
        assert_eq!(e.delete, 4); // only " put" goes
        assert_eq!(diff.injected_text(), "stay");
    }

    #[test]
    fn test_final_hypothesis_seals_session() {
        let mut diff = StabilityDiff::new();

        diff.reconcile(&partial("almost done"));
        let e = diff.reconcile(&Hypothesis::final_("almost done."));
        assert_eq!(e, Edit { delete: 0, append: ".".to_string() });
        assert!(diff.is_sealed());

        // Anything after the final hypothesis is ignored
        let late = diff.reconcile(&partial("something else entirely"));
        assert!(late.is_noop());
        assert_eq!(diff.injected_text(), "almost done.");
    }

    #[test]
    fn test_replay_reconstructs_last_hypothesis() {
        // Cumulative edits replayed against an empty string yield exactly the
        // last hypothesis text (when nothing got locked against it)
        let sequences: &[&[&str]] = &[
            &["he", "hello", "hello there"],
            &["one", "one two", "one three", "one three four"],
            &["abc", "", "xyz"],
            &["repeat", "repeat", "repeat"],
        ];

        for seq in sequences {
            let mut diff = StabilityDiff::new();
            let edits: Vec<Edit> = seq.iter().map(|t| diff.reconcile(&partial(t))).collect();
            assert_eq!(
                replay(&edits),
                *seq.last().unwrap(),
                "replay mismatch for {:?}",
                seq
            );
            assert_eq!(diff.injected_text(), *seq.last().unwrap());
        }
    }

    #[test]
    fn test_multibyte_characters() {
        let mut diff = StabilityDiff::new();

        diff.reconcile(&partial("naïve"));
        let e = diff.reconcile(&partial("naïveté"));
        assert_eq!(e, Edit { delete: 0, append: "té".to_string() });

        let e = diff.reconcile(&partial("naïve"));
        assert_eq!(e.delete, 2); // two characters, not four bytes
        assert_eq!(diff.injected_text(), "naïve");
    }
}
