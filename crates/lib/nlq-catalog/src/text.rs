//! Text normalization shared by categorization, classification, and selection.
//!
//! Text is lower-cased, split on anything that is not alphanumeric and on
//! camel-case boundaries, and each word is reduced to a crude singular form so
//! that `accounts`, `Account`, and `AccountName` line up.

/// Splits text into normalized tokens, preserving order and duplicates.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    split_words(text)
        .into_iter()
        .map(|word| singularize(&word.to_lowercase()))
        .collect()
}

/// Splits text into raw words on non-alphanumerics and camel-case humps.
#[must_use]
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in text.chars() {
        if !ch.is_alphanumeric() {
            flush(&mut current, &mut words);
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            flush(&mut current, &mut words);
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    flush(&mut current, &mut words);
    words
}

fn flush(current: &mut String, words: &mut Vec<String>) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

/// Reduces a lower-case word to a singular form using a few suffix rules.
#[must_use]
pub fn singularize(word: &str) -> String {
    if word.len() <= 3 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if let Some(stem) = word.strip_suffix("sses") {
        return format!("{stem}ss");
    }
    if word.ends_with('s') && !(word.ends_with("ss") || word.ends_with("us") || word.ends_with("is")) {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Returns true when `phrase` appears as a contiguous token run in `tokens`.
#[must_use]
pub fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty()
        && tokens.len() >= phrase.len()
        && tokens.windows(phrase.len()).any(|window| window == phrase)
}
