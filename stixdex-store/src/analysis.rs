//! Text analysis shared by match, phrase and free-text evaluation.
//!
//! Every analyzed comparison in the store goes through the same
//! tokenizer so that indexing-time and query-time views of a text
//! value agree.

/// Split a text value into lowercase alphanumeric tokens.
///
/// Punctuation, URL separators and bracketing characters all act as
/// token boundaries, so `[APT41]` and `(Citation:` analyze to the same
/// tokens as their unescaped forms.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// True when `phrase` occurs as a consecutive token run in `tokens`.
pub fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() {
        return false;
    }
    if phrase.len() > tokens.len() {
        return false;
    }
    tokens.windows(phrase.len()).any(|w| w == phrase)
}
