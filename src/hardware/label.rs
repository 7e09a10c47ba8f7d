//! Device label shortening for fixed-width columns.

/// Keep whole words while the running width (word + one separator) stays
/// below `max_len`. The first word that would reach the budget and
/// everything after it are dropped. Text already shorter than `max_len` is
/// returned as-is.
pub fn shorten(text: &str, max_len: usize) -> String {
    if text.chars().count() < max_len {
        return text.to_string();
    }

    let mut kept = Vec::new();
    let mut width = 0;

    for word in text.split(' ') {
        width += word.chars().count() + 1;
        if width < max_len {
            kept.push(word);
        } else {
            break;
        }
    }

    kept.join(" ")
}
