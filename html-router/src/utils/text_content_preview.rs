const TEXT_PREVIEW_LENGTH: usize = 120;

fn maybe_truncate(value: &str, max_chars: usize) -> Option<String> {
    value
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| format!("{}…", value[..idx].trim_end()))
}

/// Shortens `text` to the preview length on a char boundary.
pub fn preview(text: &str) -> String {
    preview_with_length(text, TEXT_PREVIEW_LENGTH)
}

pub fn preview_with_length(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    maybe_truncate(&collapsed, max_chars).unwrap_or(collapsed)
}
