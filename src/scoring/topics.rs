//! Keyword topic extraction over post titles.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use super::Post;

/// Tokens shorter than this are never topics.
pub const MIN_TOKEN_LEN: usize = 4;

/// Common words that are never topics.
pub const STOP_WORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "been", "were", "will", "would", "could", "should",
    "about", "their", "there", "these", "those", "what", "when", "where", "which", "while",
    "after",
];

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("Invalid regex for title tokens"));

/// Splits a title into candidate topic keywords.
///
/// The title is lowercased and stripped of everything but ASCII letters,
/// digits and whitespace. Short tokens and stop words are dropped. Each
/// keyword appears once, in sorted order.
pub fn tokenize(title: &str) -> BTreeSet<String> {
    let lowered = title.to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, "")
        .split_whitespace()
        .filter(|token| token.len() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Groups posts by title keyword, keeping groups of at least `min_posts`.
///
/// A post joins one group per distinct keyword in its title, so groups
/// overlap. The returned map has no meaningful order.
pub fn extract_topics(posts: &[Post], min_posts: usize) -> HashMap<String, Vec<Post>> {
    let mut groups: HashMap<String, Vec<Post>> = HashMap::new();

    for post in posts {
        for keyword in tokenize(&post.title) {
            groups.entry(keyword).or_default().push(post.clone());
        }
    }

    groups.retain(|_, group| group.len() >= min_posts);
    groups
}
