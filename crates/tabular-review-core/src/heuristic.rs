//! Deterministic keyword/pattern answer extraction.
//!
//! Used when the model backend is not configured or fails. Each question
//! is routed to exactly one branch by lower-cased keyword, checked in
//! priority order (first match wins):
//!
//! | Priority | Question mentions | Strategy |
//! |----------|-------------------|----------|
//! | 1 | `date`, `effective` | first date pattern in the leading 5000 chars |
//! | 2 | `part`, `entity`, `compan` | capitalized phrases, optional corporate suffix |
//! | 3 | `law`, `jurisdiction`, `governing` | fixed jurisdiction list, first hit |
//! | 4 | `termination`, `term` | window around the literal `termination` |
//! | 5 | anything else | window around the first question keyword found |
//!
//! Output is one [`ExtractionResult`] per question, in input order, with
//! `source = Heuristic`. Confidence is always one of a small set of fixed
//! constants in `[0.0, 1.0]` and citations are capped at
//! [`MAX_CITATION_CHARS`].
//!
//! # Example
//!
//! ```rust
//! use tabular_review_core::heuristic::heuristic_extract;
//!
//! let text = "This Agreement shall be governed by the laws of Delaware.";
//! let results = heuristic_extract(text, &["What is the governing law?".to_string()]);
//! assert_eq!(results[0].value, "Governed by laws of Delaware");
//! assert_eq!(results[0].confidence, 0.8);
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{truncate_chars, AnswerSource, ExtractionResult, MAX_CITATION_CHARS};

/// Characters of the document scanned by the date and party branches.
const SAMPLE_CHARS: usize = 5000;

/// Maximum distinct party names reported.
const MAX_PARTIES: usize = 5;

/// Party names echoed into the citation.
const MAX_CITED_PARTIES: usize = 3;

/// Candidate jurisdictions, in priority order.
const JURISDICTIONS: &[&str] = &["Delaware", "New York", "California", "Nevada", "Texas"];

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}-\d{2}-\d{2}|(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4})",
    )
    .unwrap()
});

static PARTY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,3}(?:\s+(?:Inc|LLC|Corp|Corporation|Ltd|Limited))?)",
    )
    .unwrap()
});

/// Question category, decided by keyword with fixed priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuestionKind {
    Date,
    Parties,
    Jurisdiction,
    Termination,
    Generic,
}

fn classify(question_lower: &str) -> QuestionKind {
    let mentions = |words: &[&str]| words.iter().any(|w| question_lower.contains(w));

    if mentions(&["date", "effective"]) {
        QuestionKind::Date
    } else if mentions(&["part", "entity", "compan"]) {
        QuestionKind::Parties
    } else if mentions(&["law", "jurisdiction", "governing"]) {
        QuestionKind::Jurisdiction
    } else if mentions(&["termination", "term"]) {
        QuestionKind::Termination
    } else {
        QuestionKind::Generic
    }
}

/// Derive a best-effort `(value, confidence, citation)` for every question.
///
/// Pure and deterministic: identical inputs always yield identical output.
pub fn heuristic_extract(text: &str, questions: &[String]) -> Vec<ExtractionResult> {
    let text_lower = text.to_lowercase();
    let sample = truncate_chars(text, SAMPLE_CHARS);

    questions
        .iter()
        .map(|question| {
            let (value, confidence, citation) = match classify(&question.to_lowercase()) {
                QuestionKind::Date => extract_date(&sample),
                QuestionKind::Parties => extract_parties(&sample),
                QuestionKind::Jurisdiction => extract_jurisdiction(&text_lower),
                QuestionKind::Termination => extract_termination(text, &text_lower),
                QuestionKind::Generic => extract_generic(text, &text_lower, question),
            };
            ExtractionResult {
                question: Some(question.clone()),
                value,
                confidence,
                citation: truncate_chars(&citation, MAX_CITATION_CHARS),
                source: AnswerSource::Heuristic,
            }
        })
        .collect()
}

fn extract_date(sample: &str) -> (String, f64, String) {
    match DATE_PATTERN.find(sample) {
        Some(m) => {
            let at = sample[..m.start()].chars().count();
            let context = char_window(sample, at, 50, 100);
            (
                m.as_str().to_string(),
                0.75,
                format!("Found near: ...{}...", context),
            )
        }
        None => (
            "Date not found in document".to_string(),
            0.3,
            "No date pattern detected".to_string(),
        ),
    }
}

fn extract_parties(sample: &str) -> (String, f64, String) {
    let mut parties: Vec<&str> = Vec::new();
    for caps in PARTY_PATTERN.captures_iter(sample) {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if !parties.contains(&name) {
            parties.push(name);
            if parties.len() == MAX_PARTIES {
                break;
            }
        }
    }

    if parties.is_empty() {
        return (
            "Parties not clearly identified".to_string(),
            0.4,
            "No clear party names found".to_string(),
        );
    }

    let cited: Vec<&str> = parties.iter().take(MAX_CITED_PARTIES).copied().collect();
    (
        parties.join(", "),
        0.7,
        format!("Identified entities: {}", cited.join(", ")),
    )
}

fn extract_jurisdiction(text_lower: &str) -> (String, f64, String) {
    let found = JURISDICTIONS
        .iter()
        .find(|j| text_lower.contains(&j.to_lowercase()));

    match found {
        Some(j) => (
            format!("Governed by laws of {}", j),
            0.8,
            format!("Mention of {} found in document", j),
        ),
        None => (
            "Jurisdiction not specified".to_string(),
            0.35,
            "No jurisdiction keywords detected".to_string(),
        ),
    }
}

fn extract_termination(text: &str, text_lower: &str) -> (String, f64, String) {
    match char_find(text_lower, "termination") {
        Some(at) => (
            "Termination clause present (see citation)".to_string(),
            0.65,
            format!("...{}...", char_window(text, at, 100, 200)),
        ),
        None => (
            "No termination clause found".to_string(),
            0.4,
            "Keyword 'termination' not found in document".to_string(),
        ),
    }
}

fn extract_generic(text: &str, text_lower: &str, question: &str) -> (String, f64, String) {
    let question_lower = question.to_lowercase();
    let first_hit = question_lower
        .split_whitespace()
        .filter(|word| word.chars().count() > 3)
        .find_map(|word| char_find(text_lower, word));

    match first_hit {
        Some(at) => (
            "Related content found (see citation)".to_string(),
            0.55,
            format!("...{}...", char_window(text, at, 100, 200)),
        ),
        None => (
            format!("No clear answer found for: {}", question),
            0.25,
            "Question keywords not found in document".to_string(),
        ),
    }
}

/// Character offset of the first occurrence of `needle` in `haystack`.
fn char_find(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .find(needle)
        .map(|byte_idx| haystack[..byte_idx].chars().count())
}

/// The characters from `at - before` to `at + after`, clamped to `text`.
///
/// Offsets are in characters so windows never split a UTF-8 sequence.
fn char_window(text: &str, at: usize, before: usize, after: usize) -> String {
    let start = at.saturating_sub(before);
    let end = at.saturating_add(after);
    text.chars().skip(start).take(end - start).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(text: &str, question: &str) -> ExtractionResult {
        heuristic_extract(text, &[question.to_string()])
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn governing_law_picks_jurisdiction() {
        let r = ask(
            "This Agreement shall be governed by the laws of Delaware.",
            "What is the governing law?",
        );
        assert_eq!(r.value, "Governed by laws of Delaware");
        assert_eq!(r.confidence, 0.8);
        assert_eq!(r.citation, "Mention of Delaware found in document");
        assert_eq!(r.source, AnswerSource::Heuristic);
        assert_eq!(r.question.as_deref(), Some("What is the governing law?"));
    }

    #[test]
    fn jurisdiction_respects_priority_order() {
        let r = ask(
            "Disputes go to Texas courts; this contract follows New York law.",
            "Which jurisdiction applies?",
        );
        assert_eq!(r.value, "Governed by laws of New York");
    }

    #[test]
    fn jurisdiction_missing() {
        let r = ask("No place names here.", "Governing law?");
        assert_eq!(r.value, "Jurisdiction not specified");
        assert_eq!(r.confidence, 0.35);
    }

    #[test]
    fn date_numeric_pattern() {
        let r = ask(
            "This agreement is made as of 03/15/2021 by and between the parties.",
            "What is the effective date?",
        );
        assert_eq!(r.value, "03/15/2021");
        assert_eq!(r.confidence, 0.75);
        assert!(r.citation.starts_with("Found near: ..."));
        assert!(r.citation.contains("03/15/2021"));
    }

    #[test]
    fn date_month_name_pattern() {
        let r = ask(
            "Signed on January 5, 2020 in Wilmington.",
            "When is the signing date?",
        );
        assert_eq!(r.value, "January 5, 2020");
    }

    #[test]
    fn date_missing() {
        let r = ask("No dates at all.", "Effective date?");
        assert_eq!(r.value, "Date not found in document");
        assert_eq!(r.confidence, 0.3);
        assert_eq!(r.citation, "No date pattern detected");
    }

    #[test]
    fn date_beyond_sample_is_ignored() {
        let text = format!("{}2020-01-01", "a ".repeat(3000));
        let r = ask(&text, "effective date");
        assert_eq!(r.value, "Date not found in document");
    }

    #[test]
    fn date_branch_wins_over_party_branch() {
        // "parties" would match the party branch; date has priority.
        let r = ask("dated 2021-06-30", "What date did the parties sign?");
        assert_eq!(r.value, "2021-06-30");
    }

    #[test]
    fn parties_are_deduplicated_and_capped() {
        let text = "Acme Widgets Inc and Beta Corp agree. Acme Widgets Inc shall pay. \
                    Gamma Delta and Epsilon Holdings and Zeta Limited and Omega join.";
        let r = ask(text, "Who are the parties?");
        let names: Vec<&str> = r.value.split(", ").collect();
        assert!(names.len() <= MAX_PARTIES);
        assert_eq!(names[0], "Acme Widgets Inc");
        let unique: std::collections::HashSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(r.confidence, 0.7);
        assert!(r.citation.starts_with("Identified entities: Acme Widgets Inc"));
    }

    #[test]
    fn parties_missing() {
        let r = ask("all lower case text", "which company?");
        assert_eq!(r.value, "Parties not clearly identified");
        assert_eq!(r.confidence, 0.4);
    }

    #[test]
    fn termination_window() {
        let text = format!("{}Termination for convenience is allowed.", "x".repeat(150));
        let r = ask(&text, "Termination rights?");
        assert_eq!(r.value, "Termination clause present (see citation)");
        assert_eq!(r.confidence, 0.65);
        let inner = r.citation.trim_start_matches("...").trim_end_matches("...");
        assert!(inner.starts_with(&"x".repeat(100)));
        assert!(inner.contains("Termination for convenience"));
    }

    #[test]
    fn termination_missing() {
        let r = ask("The lease runs five years.", "What is the term?");
        assert_eq!(r.value, "No termination clause found");
        assert_eq!(r.confidence, 0.4);
    }

    #[test]
    fn generic_keyword_hit() {
        let r = ask(
            "The Supplier shall maintain insurance coverage.",
            "Is insurance required?",
        );
        assert_eq!(r.value, "Related content found (see citation)");
        assert_eq!(r.confidence, 0.55);
        assert!(r.citation.contains("insurance"));
    }

    #[test]
    fn generic_no_hit() {
        let r = ask("Nothing relevant.", "Any warranty?");
        assert_eq!(r.value, "No clear answer found for: Any warranty?");
        assert_eq!(r.confidence, 0.25);
        assert_eq!(r.citation, "Question keywords not found in document");
    }

    #[test]
    fn output_is_deterministic_and_bounded() {
        let text = format!(
            "Acme Inc and Beta LLC. Effective 2020-01-01. Termination {} California.",
            "é".repeat(2000)
        );
        let questions: Vec<String> = [
            "Effective date?",
            "Parties?",
            "Governing law?",
            "Termination?",
            "What about indemnification obligations?",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let first = heuristic_extract(&text, &questions);
        let second = heuristic_extract(&text, &questions);
        assert_eq!(first, second);
        assert_eq!(first.len(), questions.len());
        for (r, q) in first.iter().zip(&questions) {
            assert_eq!(r.question.as_ref(), Some(q));
            assert!((0.0..=1.0).contains(&r.confidence));
            assert!(r.citation.chars().count() <= MAX_CITATION_CHARS);
        }
    }

    #[test]
    fn empty_inputs() {
        assert!(heuristic_extract("some text", &[]).is_empty());
        let r = ask("", "Governing law?");
        assert_eq!(r.value, "Jurisdiction not specified");
    }
}
