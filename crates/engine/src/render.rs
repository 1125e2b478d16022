//! Minimal markup for lines and result pages. Page layout proper belongs to
//! the presentation layer; this only turns stored tags into spans.

use treeidx_core::Tag;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render one line with its tags as `<span>`s. Overlapping tags and tags not
/// on character boundaries are skipped.
pub fn html_line(content: &str, tags: &[Tag]) -> String {
    let mut sorted: Vec<&Tag> = tags.iter().collect();
    sorted.sort();

    let mut html = String::new();
    let mut cursor = 0usize;
    for tag in sorted {
        let (start, end) = (tag.start as usize, tag.end as usize);
        if start < cursor
            || end <= start
            || end > content.len()
            || !content.is_char_boundary(start)
            || !content.is_char_boundary(end)
        {
            continue;
        }
        html.push_str(&escape_html(&content[cursor..start]));
        html.push_str(&format!(
            "<span class=\"{}\">{}</span>",
            escape_html(&tag.class),
            escape_html(&content[start..end])
        ));
        cursor = end;
    }
    html.push_str(&escape_html(&content[cursor..]));
    html
}
