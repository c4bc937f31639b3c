//! Ticker extraction: the first `$SYMBOL` in a piece of text.

use regex::Regex;
use std::sync::LazyLock;

static TICKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Z]+").expect("static regex"));

/// First `$TICKER` in `text`, without the dollar sign.
pub fn first_ticker(text: &str) -> Option<String> {
    TICKER
        .find(text)
        .map(|m| m.as_str().trim_start_matches('$').to_string())
}
