//! Telegram MarkdownV2 rendering for untrusted titles.
//!
//! Every character in [`RESERVED`] must reach the Bot API escaped, or the
//! whole message is rejected with "can't parse entities". Titles scraped from
//! Reddit routinely contain stray brackets, which collide with the inline link
//! syntax, so brackets get one extra pass after escaping.

/// Characters that MarkdownV2 requires to be escaped outside entities.
pub const RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

const ESCAPE: char = '\\';

/// Render raw text so it is safe to send with `parse_mode = MarkdownV2`.
///
/// Order of operations:
/// 1. escape every reserved character;
/// 2. un-escape brackets;
/// 3. if `[` and `]` counts differ, drop every bracket;
/// 4. otherwise escape the (balanced) brackets again.
///
/// Never fails; empty input renders to an empty string.
pub fn render(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let escaped = escape_all(raw);
    let unescaped = escaped.replace("\\[", "[").replace("\\]", "]");

    let opens = unescaped.chars().filter(|&c| c == '[').count();
    let closes = unescaped.chars().filter(|&c| c == ']').count();

    if opens != closes {
        unescaped.chars().filter(|&c| c != '[' && c != ']').collect()
    } else {
        unescaped.replace('[', "\\[").replace(']', "\\]")
    }
}

/// [`render`] for optional text; `None` renders to an empty string.
pub fn render_opt(raw: Option<&str>) -> String {
    raw.map(render).unwrap_or_default()
}

/// Escape a URL for the `(...)` part of an inline link.
///
/// Inside the link target only `)` and `\` are special.
pub fn escape_link_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        if c == ')' || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Build the caption shared by every recipient of one item.
///
/// The rendered title, followed by a `Source` link when the item carries a
/// non-blank attribution URL.
pub fn caption(title: &str, source_url: Option<&str>) -> String {
    let mut out = render(title.trim());

    if let Some(link) = source_url.map(str::trim).filter(|s| !s.is_empty()) {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str("[Source](");
        out.push_str(&escape_link_url(link));
        out.push(')');
    }

    out
}

fn escape_all(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for c in raw.chars() {
        if RESERVED.contains(&c) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}
