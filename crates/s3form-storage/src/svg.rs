//! Script stripping for uploaded SVG documents
//!
//! This is a focused filter, not a general-purpose sanitizer: it removes the
//! constructs that let an SVG served from a bucket execute code in a browser.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

const ACTIVE_ELEMENTS: &str = "script|foreignObject|iframe|embed|object";

// Opening, closing or self-closing tag of an active element, with any namespace prefix.
static ACTIVE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?i)<(/?)(?:[a-z_][\w.-]*:)?(?:{ACTIVE_ELEMENTS})\b(?:"[^"]*"|'[^']*'|[^'">])*>"#
    ))
    .expect("active tag pattern is valid")
});

static EVENT_HANDLERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
        .expect("event handler pattern is valid")
});

static SCRIPT_LINKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\s+(?:xlink:)?href\s*=\s*(?:"\s*(?:javascript|vbscript):[^"]*"|'\s*(?:javascript|vbscript):[^']*'|(?:javascript|vbscript):[^\s>]*)"#,
    )
    .expect("script link pattern is valid")
});

/// Remove scriptable constructs from an SVG document
///
/// Passes repeat until the document no longer changes, so removals cannot
/// splice the remaining text into a new active construct.
pub fn sanitize(svg: &str) -> String {
    let mut current = svg.to_string();
    loop {
        let next = {
            let stripped = strip_active_elements(&current);
            let without_handlers = EVENT_HANDLERS.replace_all(&stripped, "");
            SCRIPT_LINKS
                .replace_all(&without_handlers, "")
                .into_owned()
        };
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Drop active elements together with everything nested in them
///
/// Stray closing tags go too. When an element is never closed only its opening
/// tag is removed; the next pass sees what remains.
fn strip_active_elements(svg: &str) -> Cow<'_, str> {
    if !ACTIVE_TAG.is_match(svg) {
        return Cow::Borrowed(svg);
    }

    let mut out = String::with_capacity(svg.len());
    let mut last = 0;
    let mut depth = 0usize;
    let mut outer: Option<Range<usize>> = None;

    for tag in ACTIVE_TAG.captures_iter(svg) {
        let Some(whole) = tag.get(0) else { continue };
        let closing = tag.get(1).is_some_and(|m| !m.is_empty());
        let self_closing = whole.as_str().ends_with("/>");

        if depth == 0 {
            if closing || self_closing {
                out.push_str(&svg[last..whole.start()]);
                last = whole.end();
            } else {
                depth = 1;
                outer = Some(whole.range());
            }
            continue;
        }

        if closing {
            depth -= 1;
        } else if !self_closing {
            depth += 1;
        }
        if depth == 0 {
            if let Some(open) = outer.take() {
                out.push_str(&svg[last..open.start]);
            }
            last = whole.end();
        }
    }

    if let Some(open) = outer {
        if depth > 0 {
            out.push_str(&svg[last..open.start]);
            last = open.end;
        }
    }
    out.push_str(&svg[last..]);
    Cow::Owned(out)
}

/// Sanitize raw SVG bytes; invalid UTF-8 is replaced before filtering
pub fn sanitize_bytes(data: &[u8]) -> Vec<u8> {
    sanitize(&String::from_utf8_lossy(data)).into_bytes()
}
