use std::borrow::Cow;

/// Truncates a string to at most `max_chars` Unicode scalar values.
///
/// Upstream titles are free-form text of any length; storage keeps a bounded
/// title, so ingestion cuts them here. The cut always lands on a character
/// boundary and never appends an ellipsis.
///
/// Returns `Cow::Borrowed` when the string already fits.
///
/// # Examples
///
/// ```
/// use memecast::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Hello World", 5), "Hello");
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("héllo", 2), "hé");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_end, _)) => Cow::Owned(s[..byte_end].to_string()),
        None => Cow::Borrowed(s),
    }
}

/// Strips terminal control characters from untrusted text.
///
/// Removes C0 controls (except tab, newline and carriage return), DEL, and
/// ANSI CSI escape sequences (`ESC [ ... final`). A lone ESC is dropped.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_stripped = |c: char| {
        c == '\x1b' || c == '\x7f' || (c < ' ' && c != '\t' && c != '\n' && c != '\r')
    };

    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // Parameter and intermediate bytes run until the final byte (0x40..=0x7e)
                for next in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&next) {
                        break;
                    }
                }
            }
            continue;
        }
        if !is_stripped(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}

/// Canonical form of a category name: control characters stripped, then
/// trimmed. `None` when nothing is left.
///
/// Stored subscriptions and content items both go through this, so a lookup
/// by category compares like with like.
pub fn normalize_category(category: &str) -> Option<String> {
    let stripped = strip_control_chars(category);
    let trimmed = stripped.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
