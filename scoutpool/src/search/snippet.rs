/// Builds the display excerpt for a matching line.
///
/// `column` and `match_len` are measured in characters. Lines of at most
/// `width` characters are returned whole. Longer lines are cut to a window of
/// `width` characters that keeps the whole match visible, centered when
/// possible and pushed against the line edges otherwise. A match longer than
/// the window is shown from its first character.
pub fn build_snippet(line: &str, column: usize, match_len: usize, width: usize) -> String {
    let total = line.chars().count();
    if total <= width {
        return line.to_string();
    }

    let start = if match_len >= width {
        column
    } else {
        let slack = width - match_len;
        let start = column.saturating_sub(slack / 2);
        start.min(total - width)
    };

    line.chars().skip(start).take(width).collect()
}

/// Character column of the byte offset `byte_index` in `line`
pub fn char_column(line: &str, byte_index: usize) -> usize {
    line[..byte_index].chars().count()
}
