//! Sentence-completeness heuristics for generated text.
//!
//! The validator decides whether a blob of model output ends in a
//! grammatically complete sentence; the repairer truncates a blob back to
//! its last complete sentence (or re-terminates it) so that downstream
//! consumers always see syntactically terminal text.

/// Tunable knobs for the completeness heuristics. The stoplist holds words
/// that cannot plausibly end a sentence (articles, conjunctions,
/// prepositions); it is language-specific configuration data, not a
/// contract.
#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    pub min_sentence_len: usize,
    pub stoplist: Vec<String>,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        CompletionPolicy {
            min_sentence_len: 10,
            stoplist: [
                "a", "an", "the", "and", "or", "but", "nor", "of", "to", "in", "on", "at", "by",
                "for", "with", "from", "as", "if", "so", "than", "that", "which", "into", "onto",
            ]
            .iter()
            .map(|w| w.to_string())
            .collect(),
        }
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_weak(c: char) -> bool {
    matches!(c, ',' | ';' | ':' | '-')
}

/// Splits text into (sentence, trailing-punctuation-run) pairs. The run
/// includes the terminal characters and any whitespace that follows them.
/// A trailing fragment without terminal punctuation yields an empty run.
fn split_sentences(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut sentence = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if is_terminal(c) {
            let mut run = String::new();
            run.push(c);
            while let Some(&next) = chars.peek() {
                if is_terminal(next) || next.is_whitespace() {
                    run.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            pairs.push((std::mem::take(&mut sentence), run));
        } else {
            sentence.push(c);
        }
    }

    if !sentence.trim().is_empty() {
        pairs.push((sentence, String::new()));
    }

    pairs
}

/// Returns the byte offset where the final sentence starts: the position
/// after the last terminal-punctuation run that is followed by whitespace.
fn last_sentence_start(text: &str) -> usize {
    let mut start = 0;
    let mut prev_terminal = false;
    for (i, c) in text.char_indices() {
        if prev_terminal && c.is_whitespace() {
            start = i + c.len_utf8();
        }
        if !c.is_whitespace() {
            prev_terminal = is_terminal(c);
        }
    }
    start
}

fn last_word_stripped(text: &str) -> String {
    text.split_whitespace()
        .last()
        .unwrap_or("")
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '…'))
        .collect::<String>()
        .to_lowercase()
}

/// True when `text` ends in a grammatically complete sentence. Pure.
pub fn is_complete(text: &str, policy: &CompletionPolicy) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let Some(last_char) = trimmed.chars().last() else {
        return false;
    };
    if !is_terminal(last_char) {
        return false;
    }
    // An ellipsis at the very end reads as trailing off, not as a finished
    // thought.
    if last_char == '…' {
        return false;
    }

    let final_sentence = trimmed[last_sentence_start(trimmed)..].trim();
    if final_sentence.chars().count() < policy.min_sentence_len {
        return false;
    }

    let last_word = last_word_stripped(trimmed);
    if policy.stoplist.iter().any(|w| *w == last_word) {
        return false;
    }

    true
}

/// Best-effort repair: truncate back to the last complete sentence, or
/// re-terminate with a period. The result always ends with terminal
/// punctuation; it is not guaranteed to be semantically complete.
pub fn repair(text: &str, policy: &CompletionPolicy) -> String {
    let trimmed = text.trim();
    if is_complete(trimmed, policy) {
        return trimmed.to_string();
    }

    // Keep leading sentences that clear the length threshold; the first one
    // that fails is treated as truncated output and dropped along with
    // everything after it.
    let mut kept = String::new();
    for (sentence, run) in split_sentences(trimmed) {
        if sentence.trim().chars().count() > policy.min_sentence_len {
            kept.push_str(&sentence);
            kept.push_str(&run);
        } else {
            break;
        }
    }

    let mut repaired = if kept.trim().is_empty() {
        trimmed.to_string()
    } else {
        kept.trim().to_string()
    };

    // Strip weak trailing punctuation (and a trailing ellipsis) before
    // re-terminating.
    while repaired
        .chars()
        .last()
        .is_some_and(|c| is_weak(c) || c == '…')
    {
        repaired.pop();
        repaired.truncate(repaired.trim_end().len());
    }
    if !repaired.chars().last().is_some_and(is_terminal) {
        repaired.push('.');
    }

    // If the final retained sentence is still too short, drop it and fall
    // back to the prior sentence's own punctuation.
    let start = last_sentence_start(&repaired);
    if start > 0 {
        let final_sentence = repaired[start..].trim();
        if final_sentence.chars().count() < policy.min_sentence_len {
            repaired.truncate(start);
            repaired.truncate(repaired.trim_end().len());
            if !repaired.chars().last().is_some_and(is_terminal) {
                repaired.push('.');
            }
        }
    }

    repaired
}

/// Drops a trailing fragment that never reached terminal punctuation.
/// Used when preparing continuation context and when splicing a completion
/// onto existing text.
pub fn strip_trailing_incomplete(text: &str) -> String {
    let pairs = split_sentences(text);
    let mut out = String::new();
    for (sentence, run) in &pairs {
        if run.is_empty() {
            break;
        }
        out.push_str(sentence);
        out.push_str(run);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CompletionPolicy {
        CompletionPolicy::default()
    }

    #[test]
    fn accepts_terminal_sentences() {
        let p = policy();
        assert!(is_complete("The fox crossed the frozen river at dawn.", &p));
        assert!(is_complete("Would anyone have believed it?", &p));
        assert!(is_complete("The gates finally opened!  ", &p));
    }

    #[test]
    fn rejects_empty_and_unterminated() {
        let p = policy();
        assert!(!is_complete("", &p));
        assert!(!is_complete("   \n ", &p));
        assert!(!is_complete("The fox crossed the river", &p));
    }

    #[test]
    fn rejects_weak_endings() {
        let p = policy();
        assert!(!is_complete("The fox crossed the river,", &p));
        assert!(!is_complete("It carried three things;", &p));
        assert!(!is_complete("And then it happened…", &p));
    }

    #[test]
    fn rejects_short_final_sentence() {
        let p = policy();
        assert!(!is_complete("The fox crossed the frozen river. Yes.", &p));
    }

    #[test]
    fn rejects_stoplist_final_word() {
        let p = policy();
        assert!(!is_complete("The meeting ran long because of the.", &p));
        assert!(!is_complete("Everything changed after they looked at.", &p));
    }

    #[test]
    fn repair_keeps_valid_text_unchanged() {
        let p = policy();
        let text = "The fox crossed the frozen river at dawn.";
        assert_eq!(repair(text, &p), text);
    }

    #[test]
    fn repair_truncates_to_last_complete_sentence() {
        let p = policy();
        let text = "The fox crossed the frozen river at dawn. Then it";
        assert_eq!(repair(text, &p), "The fox crossed the frozen river at dawn.");
    }

    #[test]
    fn repair_replaces_weak_ending_with_period() {
        let p = policy();
        let repaired = repair("The fox crossed the frozen river at dawn,", &p);
        assert_eq!(repaired, "The fox crossed the frozen river at dawn.");
    }

    #[test]
    fn repair_drops_short_trailing_sentence() {
        let p = policy();
        let repaired = repair("A perfectly complete first sentence sits here. Tiny bit. ", &p);
        assert_eq!(repaired, "A perfectly complete first sentence sits here.");
    }

    #[test]
    fn repaired_text_passes_validation() {
        let p = policy();
        for input in [
            "The fox crossed the frozen river at dawn. Then it turned back toward",
            "Nobody expected the answer to arrive so quickly,",
            "The committee deliberated for three days straight;",
            "A storm rolled in over the harbor that evening…",
        ] {
            let repaired = repair(input, &p);
            assert!(
                is_complete(&repaired, &p),
                "repair({input:?}) = {repaired:?} still invalid"
            );
        }
    }

    #[test]
    fn repair_is_idempotent_once_valid() {
        let p = policy();
        let once = repair("Nobody expected the answer to arrive so quickly,", &p);
        assert_eq!(repair(&once, &p), once);
    }

    #[test]
    fn repair_grows_by_at_most_one_char_when_a_sentence_exists() {
        let p = policy();
        for input in [
            "The fox crossed the frozen river at dawn. Then it ran toward the hills",
            "The fox crossed the frozen river at dawn. It paused,",
        ] {
            let repaired = repair(input, &p);
            assert!(repaired.len() <= input.len() + 1);
        }
    }

    #[test]
    fn strip_trailing_incomplete_removes_fragment() {
        assert_eq!(
            strip_trailing_incomplete("One full sentence here. And then a dangling"),
            "One full sentence here."
        );
        assert_eq!(strip_trailing_incomplete("no terminal at all"), "");
    }
}
