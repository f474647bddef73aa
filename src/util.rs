use std::path::Path;

/// Render `path` relative to `base` when it lives underneath it.
pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    base.and_then(|base| path.strip_prefix(base).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Longest prefix of `text` within `max_bytes` that ends on a char boundary.
pub fn clip_str(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let end = (0..=max_bytes)
        .rev()
        .find(|&index| text.is_char_boundary(index))
        .unwrap_or(0);
    &text[..end]
}

/// Captured process output as text, invalid UTF-8 replaced, capped at
/// `max_bytes`.
pub fn output_text(bytes: &[u8], max_bytes: usize) -> String {
    clip_str(&String::from_utf8_lossy(bytes), max_bytes).to_string()
}

/// First non-empty line of `text`, bounded to `max_bytes`.
pub fn first_line(text: &str, max_bytes: usize) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    clip_str(line, max_bytes).to_string()
}
