//! Cleanup passes for model-produced text.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the cleanup pipeline on one completion's `text`.
///
/// Every `"` becomes `'`; line endings, blank-line runs and trailing
/// whitespace are normalized.
pub fn sanitize_completion_text(text: &str) -> String {
    let mut result = text.to_string();

    result = normalize_line_endings(&result);
    result = replace_double_quotes(&result);
    result = clean_blank_lines(&result);
    result = trim_trailing_whitespace(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Line endings
// ---------------------------------------------------------------------------

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Quotes
// ---------------------------------------------------------------------------

fn replace_double_quotes(text: &str) -> String {
    text.replace('"', "'")
}

// ---------------------------------------------------------------------------
// Pass 3: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2.
fn clean_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Trailing whitespace
// ---------------------------------------------------------------------------

/// Trim line ends, keeping the single space a bare list or checkbox marker
/// (`- `, `1. `, `- [ ] `) needs to still read as one.
fn trim_trailing_whitespace(text: &str) -> String {
    static BARE_MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(?:- \[[ x]\]|-|\d+\.)\s+$").expect("valid regex"));

    text.lines()
        .map(|line| {
            if BARE_MARKER_RE.is_match(line) {
                format!("{} ", line.trim_end())
            } else {
                line.trim_end().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end_matches('\n')
        .to_string()
}

// ---------------------------------------------------------------------------
// Code languages
// ---------------------------------------------------------------------------

/// Map a fence language hint to a language name Notion accepts.
///
/// Handles short aliases (`js`, `py`, `sh`) and `language-`/`lang-` prefixes.
/// Unknown or empty hints become `plain text`.
pub fn normalize_code_language(hint: &str) -> String {
    static PREFIX_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(?:language-|lang-)").expect("valid regex"));

    let hint = hint.trim().to_lowercase();
    let hint = PREFIX_RE.replace(&hint, "");

    let name = match hint.as_ref() {
        "" | "text" | "txt" | "plain" | "plaintext" => "plain text",
        "js" | "javascript" | "jsx" => "javascript",
        "ts" | "typescript" | "tsx" => "typescript",
        "py" | "python" => "python",
        "rs" | "rust" => "rust",
        "sh" | "bash" | "zsh" | "shell" => "shell",
        "yml" | "yaml" => "yaml",
        "md" | "markdown" => "markdown",
        "json" => "json",
        "toml" => "toml",
        "sql" => "sql",
        "go" | "golang" => "go",
        "java" => "java",
        "c" => "c",
        "cpp" | "c++" => "c++",
        "cs" | "c#" | "csharp" => "c#",
        "rb" | "ruby" => "ruby",
        "html" => "html",
        "css" => "css",
        "diff" => "diff",
        "mermaid" => "mermaid",
        _ => "plain text",
    };
    name.to_string()
}
