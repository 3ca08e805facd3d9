//! Builds a short, human-scannable excerpt around the first match of a
//! query term, falling back to a plain head-truncation when nothing matches
//! (e.g. the hit came from the semantic branch only).

const SNIPPET_RADIUS: usize = 80;
const SNIPPET_MAX_LEN: usize = 200;

pub fn make_snippet(text: &str, query: &str) -> String {
    let lower_text = text.to_lowercase();
    let lower_query = query.to_lowercase();

    let Some(byte_pos) = lower_query
        .split_whitespace()
        .find_map(|term| lower_text.find(term))
    else {
        return truncate(text, SNIPPET_MAX_LEN);
    };

    let start = byte_pos.saturating_sub(SNIPPET_RADIUS);
    let start = floor_char_boundary(text, start);
    let end = (byte_pos + SNIPPET_RADIUS).min(text.len());
    let end = ceil_char_boundary(text, end);

    let mut snippet = text[start..end].trim().to_string();
    if start > 0 {
        snippet = format!("…{snippet}");
    }
    if end < text.len() {
        snippet = format!("{snippet}…");
    }
    snippet
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let end = ceil_char_boundary(text, max_len.min(text.len()));
    format!("{}…", text[..end].trim())
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_centers_on_first_match() {
        let text = "a".repeat(200) + "needle" + &"b".repeat(200);
        let snippet = make_snippet(&text, "needle");
        assert!(snippet.contains("needle"));
        assert!(snippet.starts_with('…'));
        assert!(snippet.ends_with('…'));
    }

    #[test]
    fn falls_back_to_head_truncation_when_no_match() {
        let text = "x".repeat(300);
        let snippet = make_snippet(&text, "absent term");
        assert!(snippet.ends_with('…'));
        assert!(snippet.len() < text.len());
    }
}
