//! Context retrieval: keyword-enriched similarity search over the vector index.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use pagewright_shared::{Block, RetrievedDocument};

use crate::index::VectorIndex;
use crate::keywords::{MAX_KEYWORDS, extract_keywords};

/// Returned in place of a context when nothing related was found.
pub const NO_CONTEXT_PLACEHOLDER: &str = "no related information found";

const SEARCH_INTENT: &str = "Find pages related to the following page.";
const SUMMARY_MAX_CHARS: usize = 300;
const EXCERPT_MAX_CHARS: usize = 700;
const HIGH_RELEVANCE_COUNT: usize = 3;
const SENTENCE_ENDINGS: [char; 7] = ['。', '.', '!', '?', '！', '？', '\n'];

/// Builds the related-pages context handed to the generator.
pub struct ContextRetriever {
    index: Arc<VectorIndex>,
    k: usize,
}

impl ContextRetriever {
    /// `k` is the number of related pages kept after re-ranking.
    pub fn new(index: Arc<VectorIndex>, k: usize) -> Self {
        Self { index, k }
    }

    /// Search the index for pages related to this one and format them.
    ///
    /// Never fails: search errors are logged and yield the placeholder.
    #[instrument(skip_all, fields(title = %title))]
    pub async fn retrieve_context(&self, title: &str, categories: &[String], blocks: &[Block]) -> String {
        let body = blocks
            .iter()
            .map(|b| b.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let keywords: Vec<String> = extract_keywords(title, &body, MAX_KEYWORDS)
            .into_iter()
            .map(|k| k.term)
            .collect();
        debug!(?keywords, "extracted keywords");

        let query = build_query(title, categories, &keywords, &body);

        let hits = match self.index.similarity_search(&query, self.k * 2).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "context search failed, continuing without context");
                Vec::new()
            }
        };

        let hits = rerank(hits, self.k);
        for (i, hit) in hits.iter().take(HIGH_RELEVANCE_COUNT).enumerate() {
            debug!(rank = i + 1, score = hit.score, title = %hit.title, "top hit");
        }
        info!(hits = hits.len(), "context retrieved");

        format_context(&hits)
    }
}

/// Compose the search query: intent, title, categories, keywords and a body summary.
pub fn build_query(title: &str, categories: &[String], keywords: &[String], body: &str) -> String {
    let mut lines = vec![SEARCH_INTENT.to_string(), format!("Title: {title}")];
    if !categories.is_empty() {
        lines.push(format!("Categories: {}", categories.join(", ")));
    }
    if !keywords.is_empty() {
        lines.push(format!("Keywords: {}", keywords.join(", ")));
    }
    let summary = summarize(body, SUMMARY_MAX_CHARS);
    if !summary.trim().is_empty() {
        lines.push(format!("Summary: {summary}"));
    }
    lines.join("\n")
}

/// Cut `body` to at most `max_chars`, at the last sentence ending when one
/// falls in the second half of the window, otherwise hard.
pub fn summarize(body: &str, max_chars: usize) -> String {
    let chars: Vec<char> = body.chars().collect();
    if chars.len() <= max_chars {
        return body.to_string();
    }

    let window = &chars[..max_chars];
    let cut = window
        .iter()
        .rposition(|c| SENTENCE_ENDINGS.contains(c))
        .filter(|&i| i >= max_chars / 2)
        .map(|i| i + 1)
        .unwrap_or(max_chars);

    window[..cut].iter().collect::<String>().trim_end().to_string()
}

/// Sort by descending score and keep the top `k`.
fn rerank(mut hits: Vec<RetrievedDocument>, k: usize) -> Vec<RetrievedDocument> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k);
    hits
}

/// One labeled block per hit, separated by blank lines.
pub fn format_context(hits: &[RetrievedDocument]) -> String {
    if hits.is_empty() {
        return NO_CONTEXT_PLACEHOLDER.to_string();
    }

    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let relevance = if i < HIGH_RELEVANCE_COUNT {
                "high relevance"
            } else {
                "related"
            };
            let excerpt: String = hit.content.chars().take(EXCERPT_MAX_CHARS).collect();
            format!(
                "[{relevance}] {kind}: {title}\nID: {id}\nCategories: {categories}\nStatus: {status}\nURL: {url}\nExcerpt: {excerpt}",
                kind = hit.kind.label(),
                title = hit.title,
                id = hit.id,
                categories = hit.categories.join(", "),
                status = hit.status.as_deref().unwrap_or("-"),
                url = hit.url.as_deref().unwrap_or("-"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
