#![forbid(unsafe_code)]

//! Entity escaping for canonical output.
//!
//! - Text: `\r` → `&#xD;`, `&` → `&amp;`, `<` → `&lt;`, `>` → `&gt;`
//! - Attribute values: `\t` → `&#x9;`, `\n` → `&#xA;`, `\r` → `&#xD;`,
//!   `"` → `&quot;`, `&` → `&amp;`, `<` → `&lt;`

fn escape_into(out: &mut String, s: &str, replace: fn(char) -> Option<&'static str>) {
    let mut from = 0;
    for (i, ch) in s.char_indices() {
        if let Some(entity) = replace(ch) {
            out.push_str(&s[from..i]);
            out.push_str(entity);
            from = i + ch.len_utf8();
        }
    }
    out.push_str(&s[from..]);
}

/// Append text node content to `out`.
pub fn text(out: &mut String, s: &str) {
    escape_into(out, s, |ch| match ch {
        '\r' => Some("&#xD;"),
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    });
}

/// Append an attribute value to `out`.
pub fn attr(out: &mut String, s: &str) {
    escape_into(out, s, |ch| match ch {
        '\t' => Some("&#x9;"),
        '\n' => Some("&#xA;"),
        '\r' => Some("&#xD;"),
        '"' => Some("&quot;"),
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        _ => None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn esc(f: fn(&mut String, &str), s: &str) -> String {
        let mut out = String::new();
        f(&mut out, s);
        out
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(esc(text, "hello"), "hello");
        assert_eq!(esc(text, "a&b<c>d\"e"), "a&amp;b&lt;c&gt;d\"e");
        assert_eq!(esc(text, "line\r\tend\n"), "line&#xD;\tend\n");
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(esc(attr, "hello"), "hello");
        assert_eq!(esc(attr, "a&b\"c>"), "a&amp;b&quot;c>");
        assert_eq!(esc(attr, "a\tb\nc\rd"), "a&#x9;b&#xA;c&#xD;d");
    }
}
