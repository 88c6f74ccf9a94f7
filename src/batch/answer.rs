//! Answer letter extraction from free-form model output

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use super::question::NO_ANSWER;

const DEFAULT_LETTERS: [&str; 5] = ["A", "B", "C", "D", "E"];

lazy_static! {
    /// Compiled patterns keyed by the letter alternation they were built for
    static ref PATTERNS: Mutex<HashMap<String, Arc<Vec<Regex>>>> = Mutex::new(HashMap::new());
}

/// Text the answer is read from: whatever follows the last `</think>`,
/// or the whole response when there is no reasoning block
pub fn answer_region(response: &str) -> &str {
    match response.rfind("</think>") {
        Some(pos) => &response[pos + "</think>".len()..],
        None => response,
    }
}

/// Pick the option letter a response commits to.
///
/// Valid letters are the option keys (A-E when there are none). Patterns
/// are tried in order: `<answer>L</answer>`, `answer: L`, a standalone
/// letter, `option L`, `choice L`. Failing those, the first option whose
/// text appears in the response wins. Otherwise `X`.
pub fn extract_answer(response: &str, options: &[(String, String)]) -> String {
    let text = answer_region(response).trim().to_uppercase();

    let letters: Vec<String> = if options.is_empty() {
        DEFAULT_LETTERS.iter().map(|l| l.to_string()).collect()
    } else {
        options.iter().map(|(key, _)| key.trim().to_uppercase()).collect()
    };
    let alternatives = letters
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| regex::escape(l))
        .collect::<Vec<_>>()
        .join("|");

    if !alternatives.is_empty() {
        for re in patterns_for(&alternatives).iter() {
            if let Some(letter) = first_capture(re, &text) {
                return letter;
            }
        }
    }

    let lowered = text.to_lowercase();
    options
        .iter()
        .find(|(_, value)| {
            let value = value.trim().to_lowercase();
            !value.is_empty() && lowered.contains(&value)
        })
        .map(|(key, _)| key.clone())
        .unwrap_or_else(|| NO_ANSWER.to_string())
}

/// Extraction patterns for one letter alternation, in priority order.
/// Compiled once per distinct option set.
fn patterns_for(alternatives: &str) -> Arc<Vec<Regex>> {
    let mut cache = PATTERNS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(patterns) = cache.get(alternatives) {
        return Arc::clone(patterns);
    }

    let patterns: Vec<Regex> = [
        format!(r"<ANSWER>\s*\[?({})\]?\s*</ANSWER>", alternatives),
        format!(r"ANSWER[\s:]*({})", alternatives),
        format!(r"\b({})\b", alternatives),
        format!(r"OPTION[\s:]*({})", alternatives),
        format!(r"CHOICE[\s:]*({})", alternatives),
    ]
    .iter()
    .filter_map(|pattern| compile(pattern))
    .collect();

    let patterns = Arc::new(patterns);
    cache.insert(alternatives.to_string(), Arc::clone(&patterns));
    patterns
}

fn compile(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern).case_insensitive(true).build().ok()
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abcd() -> Vec<(String, String)> {
        [("A", "BRAF"), ("B", "EGFR"), ("C", "KRAS"), ("D", "MYC")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_answer_tag() {
        assert_eq!(extract_answer("Reasoning... <answer>C</answer>", &abcd()), "C");
        assert_eq!(extract_answer("<answer>[b]</answer>", &abcd()), "B");
    }

    #[test]
    fn test_answer_prefix_and_lowercase() {
        assert_eq!(extract_answer("the answer is: d", &abcd()), "D");
    }

    #[test]
    fn test_reasoning_block_is_ignored() {
        let response = "<think>Maybe A? Or B.</think>\nFinal: <answer>C</answer>";
        assert_eq!(extract_answer(response, &abcd()), "C");
        assert_eq!(answer_region("no think here"), "no think here");
    }

    #[test]
    fn test_option_text_fallback() {
        assert_eq!(extract_answer("It is clearly kras-driven", &abcd()), "C");
    }

    #[test]
    fn test_no_answer() {
        assert_eq!(extract_answer("I'm not sure.", &abcd()), "X");
        assert_eq!(extract_answer("", &abcd()), "X");
    }

    #[test]
    fn test_default_letters_without_options() {
        assert_eq!(extract_answer("<answer>E</answer>", &[]), "E");
        assert_eq!(extract_answer("<answer>F</answer>", &[]), "X");
    }

    #[test]
    fn test_patterns_are_compiled_once_per_letter_set() {
        let first = patterns_for("A|B|C");
        let again = patterns_for("A|B|C");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.len(), 5);
        assert!(!Arc::ptr_eq(&first, &patterns_for("A|B")));

        // Same letters, same answers across calls
        assert_eq!(extract_answer("<answer>b</answer>", &abcd()), "B");
        assert_eq!(extract_answer("choice: d", &abcd()), "D");
    }

    #[test]
    fn test_letters_outside_options_are_ignored() {
        let two = vec![("A".to_string(), "yes".to_string()), ("B".to_string(), "no".to_string())];
        assert_eq!(extract_answer("<answer>C</answer> so B", &two), "B");
    }
}
