//! Bilingual (English + Japanese) keyword extraction.
//!
//! Space-delimited text is split on whitespace. Runs of Han, Hiragana and
//! Katakana characters have no word boundaries, so every substring of length
//! 2–10 inside a run becomes a candidate and frequency does the rest.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// Maximum number of keywords returned by default.
pub const MAX_KEYWORDS: usize = 15;

const MIN_TOKEN_CHARS: usize = 2;
const MAX_TOKEN_CHARS: usize = 15;
const MIN_WINDOW: usize = 2;
const MAX_WINDOW: usize = 10;

/// Multiplier for a keyword that also appears in the title.
pub const TITLE_BOOST: f64 = 3.0;
/// Multiplier for keywords of 3–10 characters.
pub const LENGTH_BOOST: f64 = 1.5;

static CJK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Han}\p{Hiragana}\p{Katakana}ー]+").expect("valid regex"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did",
        "do", "does", "for", "from", "had", "has", "have", "how", "if", "in", "into", "is", "it",
        "its", "may", "might", "more", "most", "must", "not", "of", "on", "or", "our", "should",
        "so", "some", "such", "than", "that", "the", "their", "them", "then", "there", "these",
        "they", "this", "those", "to", "very", "was", "we", "were", "what", "when", "which",
        "who", "will", "with", "would", "you", "your", "also", "about", "just", "only", "each",
        "all", "any",
        // Japanese
        "これ", "それ", "あれ", "この", "その", "あの", "ここ", "そこ", "ため", "こと", "もの",
        "よう", "など", "です", "ます", "でした", "ました", "する", "した", "して", "します",
        "いる", "いた", "ある", "あり", "なる", "なり", "れる", "られる", "から", "まで", "より",
        "ので", "のに", "けど", "また", "および", "について", "として", "による", "において",
        "できる", "ない", "という", "といった", "ください",
    ]
    .into_iter()
    .collect()
});

/// A candidate keyword with its weighted score.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub term: String,
    pub score: f64,
}

/// Extract up to `limit` weighted keywords from `body`.
///
/// Score = frequency, ×[`TITLE_BOOST`] when the title contains the term,
/// ×[`LENGTH_BOOST`] when the term is 3–10 characters. Sorted by descending
/// score, ties broken alphabetically.
pub fn extract_keywords(title: &str, body: &str, limit: usize) -> Vec<Keyword> {
    let title_lower = title.to_lowercase();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(body) {
        if is_candidate(&token) {
            *counts.entry(token).or_default() += 1;
        }
    }

    let mut keywords: Vec<Keyword> = counts
        .into_iter()
        .map(|(term, count)| {
            let mut score = count as f64;
            if title_lower.contains(&term) {
                score *= TITLE_BOOST;
            }
            let len = term.chars().count();
            if (3..=10).contains(&len) {
                score *= LENGTH_BOOST;
            }
            Keyword { term, score }
        })
        .collect();

    keywords.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.term.cmp(&b.term))
    });
    keywords.truncate(limit);
    keywords
}

/// Split mixed-script text into lowercase candidate tokens (unfiltered).
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for piece in text.split_whitespace() {
        let mut last = 0;
        for run in CJK_RUN_RE.find_iter(piece) {
            push_spaced(&piece[last..run.start()], &mut tokens);
            push_windows(run.as_str(), &mut tokens);
            last = run.end();
        }
        push_spaced(&piece[last..], &mut tokens);
    }

    tokens
}

/// A space-delimited word, stripped of surrounding punctuation.
fn push_spaced(segment: &str, tokens: &mut Vec<String>) {
    let word = segment.trim_matches(|c: char| !c.is_alphanumeric());
    if !word.is_empty() {
        tokens.push(word.to_lowercase());
    }
}

/// Every substring of 2–10 characters of an ideographic/syllabic run.
fn push_windows(run: &str, tokens: &mut Vec<String>) {
    let chars: Vec<char> = run.chars().collect();
    for size in MIN_WINDOW..=MAX_WINDOW.min(chars.len()) {
        for window in chars.windows(size) {
            tokens.push(window.iter().collect());
        }
    }
}

fn is_candidate(token: &str) -> bool {
    let len = token.chars().count();
    (MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&len)
        && !token.chars().all(|c| c.is_numeric())
        && !STOP_WORDS.contains(token)
}
