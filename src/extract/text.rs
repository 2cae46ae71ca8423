//! Uniform text post-processing for extracted values

/// Returns true for directional marks, embeddings/isolates and zero-width characters
fn is_invisible_control(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'
            | '\u{061C}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
    )
}

/// Cleans raw extracted text
///
/// Strips directional and invisible control characters (LRM/RLM, embedding
/// and pop-directional marks, isolates, ZWNJ/ZWJ, BOM), collapses every
/// whitespace run to a single space and trims both ends.
///
/// # Example
///
/// ```
/// use archive_harvester::extract::clean_text;
///
/// assert_eq!(clean_text("\u{200F}  hello \n\t world \u{202C}"), "hello world");
/// ```
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars() {
        if is_invisible_control(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    out
}
