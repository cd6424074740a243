use std::borrow::Cow;

use quick_xml::escape::resolve_html5_entity;
use unicode_width::UnicodeWidthChar;

/// Longest entity body we try to resolve (`&CounterClockwiseContourIntegral;`
/// is the longest HTML5 name at 31 bytes).
const MAX_ENTITY_LEN: usize = 32;

/// Decodes HTML character references in feed text.
///
/// Feed titles and descriptions are frequently escaped twice, so after the XML
/// layer has run they still contain `&amp;`, `&#39;`, `&rsquo;` and friends.
/// Named HTML5 entities, decimal (`&#8217;`) and hex (`&#x2019;`) references
/// are replaced by their characters. Anything that is not a well-formed,
/// known reference (a bare `&` as in "AT&T", an unknown name, a code point
/// outside Unicode) is kept verbatim.
///
/// Returns `Cow::Borrowed` when the input has no `&`.
///
/// # Examples
///
/// ```
/// use gator::util::decode_entities;
///
/// assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
/// assert_eq!(decode_entities("It&#39;s &#x41;"), "It's A");
/// assert_eq!(decode_entities("AT&T"), "AT&T");
/// ```
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];

        let decoded = after
            .char_indices()
            .take(MAX_ENTITY_LEN + 1)
            .find(|&(_, c)| c == ';')
            .and_then(|(semi, _)| resolve_reference(&after[..semi]).map(|r| (r, semi)));

        match decoded {
            Some((replacement, semi)) => {
                out.push_str(&replacement);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn resolve_reference(body: &str) -> Option<Cow<'static, str>> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        // NUL is not a valid character reference
        if code == 0 {
            return None;
        }
        return char::from_u32(code).map(|c| Cow::Owned(c.to_string()));
    }

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    resolve_html5_entity(body).map(Cow::Borrowed)
}

/// Strip terminal control characters and ANSI escape sequences.
///
/// Feed text is printed straight to the terminal by `browse`, so CSI
/// (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ST`) sequences, bare ESC, DEL
/// and C0 controls other than tab/newline/CR are removed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_unsafe = |c: char| c == '\x1b' || c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_unsafe) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameters run until the final byte 0x40..=0x7E
                    for p in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&p) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(p) = chars.next() {
                        if p == '\x07' {
                            break;
                        }
                        if p == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_unsafe(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}

/// Truncates to at most `max_width` terminal columns, ending in `...` when
/// something was cut. Widths of 3 or less are filled with characters only.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    const ELLIPSIS: &str = "...";

    let width_of = |c: char| UnicodeWidthChar::width(c).unwrap_or(0);
    let total: usize = s.chars().map(width_of).sum();
    if total <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width > ELLIPSIS.len() {
        max_width - ELLIPSIS.len()
    } else {
        max_width
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = width_of(c);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width > ELLIPSIS.len() {
        Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
    } else {
        Cow::Owned(s[..end].to_string())
    }
}
