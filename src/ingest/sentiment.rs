//! Keyword-lexicon sentiment scoring.
//!
//! Comparative score: sum of word valences divided by the number of
//! tokens. Neutral text scores 0; a single strongly positive word in a
//! short message can push it above 1.

const LEXICON: &[(&str, i32)] = &[
    // positive
    ("moon", 3),
    ("mooning", 3),
    ("pump", 2),
    ("pumping", 2),
    ("bullish", 3),
    ("breakout", 2),
    ("buy", 2),
    ("long", 1),
    ("gem", 2),
    ("win", 4),
    ("winning", 4),
    ("success", 2),
    ("gain", 2),
    ("gains", 2),
    ("profit", 2),
    ("rise", 1),
    ("surge", 2),
    ("rally", 2),
    ("breakthrough", 3),
    ("strong", 2),
    ("boost", 1),
    ("record", 1),
    ("optimistic", 2),
    ("confident", 2),
    ("growth", 2),
    ("good", 3),
    ("great", 3),
    ("huge", 1),
    ("easy", 1),
    ("safe", 1),
    ("love", 3),
    ("amazing", 4),
    ("opportunity", 2),
    ("🚀", 3),
    // negative
    ("dump", -2),
    ("dumping", -2),
    ("bearish", -3),
    ("sell", -1),
    ("short", -1),
    ("rug", -3),
    ("rugged", -3),
    ("scam", -3),
    ("lose", -3),
    ("loss", -3),
    ("fail", -2),
    ("drop", -1),
    ("fall", -2),
    ("crash", -3),
    ("crisis", -3),
    ("collapse", -2),
    ("weak", -2),
    ("decline", -1),
    ("worst", -3),
    ("threat", -2),
    ("risk", -2),
    ("risky", -2),
    ("fear", -2),
    ("panic", -3),
    ("bad", -3),
    ("hack", -1),
    ("hacked", -1),
    ("exploit", -1),
    ("avoid", -1),
];

fn valence(word: &str) -> i32 {
    LEXICON
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, v)| *v)
        .unwrap_or(0)
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Sum of valences over all tokens.
fn score(text: &str) -> i32 {
    tokens(text).map(|t| valence(&t)).sum()
}

/// Score normalised by token count. Zero for empty text.
pub fn comparative(text: &str) -> f64 {
    let count = tokens(text).count();
    if count == 0 {
        return 0.0;
    }
    score(text) as f64 / count as f64
}

/// Whether `text` clears an optional threshold. `None` accepts everything.
pub fn passes(text: &str, min: Option<f64>) -> bool {
    match min {
        Some(threshold) => comparative(text) > threshold,
        None => true,
    }
}
