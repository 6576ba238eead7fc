//! Content type detection from the first bytes of a file stream

use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};

use crate::types::FileStream;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// Bytes inspected before the stream is handed on
pub const SNIFF_LENGTH: usize = 4096;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Guess a content type from magic bytes, falling back to octet-stream
pub fn detect(prefix: &[u8]) -> String {
    // SVG first: infer reports an XML declaration as text/xml
    if is_svg(prefix) {
        return SVG_CONTENT_TYPE.to_string();
    }
    if let Some(kind) = infer::get(prefix) {
        return kind.mime_type().to_string();
    }
    DEFAULT_CONTENT_TYPE.to_string()
}

/// Whether the document root is an `svg` element
///
/// An XML prolog that runs past the end of `prefix` counts as SVG, since the
/// root cannot be seen.
pub fn is_svg(prefix: &[u8]) -> bool {
    match scan_prolog(prefix) {
        Prolog::Root(name) => {
            let local = name.rsplit(|&b| b == b':').next().unwrap_or(name);
            local.eq_ignore_ascii_case(b"svg")
        }
        Prolog::Truncated { xml } => xml,
        Prolog::NotMarkup => false,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Prolog<'a> {
    /// Name of the first element
    Root(&'a [u8]),
    /// Input ended inside the prolog; `xml` when a declaration or doctype was seen
    Truncated { xml: bool },
    NotMarkup,
}

fn scan_prolog(data: &[u8]) -> Prolog<'_> {
    let mut rest = data.strip_prefix(BOM).unwrap_or(data);
    let mut xml = false;

    loop {
        rest = rest.trim_ascii_start();
        if rest.is_empty() {
            return if xml {
                Prolog::Truncated { xml }
            } else {
                Prolog::NotMarkup
            };
        }
        if rest[0] != b'<' {
            return Prolog::NotMarkup;
        }

        let skipped = if rest.starts_with(b"<?") {
            xml |= starts_with_ignore_case(&rest[2..], b"xml");
            find(rest, b"?>").map(|end| end + 2)
        } else if rest.starts_with(b"<!--") {
            find(&rest[4..], b"-->").map(|end| end + 7)
        } else if starts_with_ignore_case(rest, b"<!DOCTYPE") {
            xml = true;
            doctype_end(rest).map(|end| end + 1)
        } else {
            let name_len = rest[1..]
                .iter()
                .position(|&b| b.is_ascii_whitespace() || b == b'/' || b == b'>');
            return match name_len {
                Some(len) => Prolog::Root(&rest[1..1 + len]),
                None => Prolog::Truncated { xml },
            };
        };

        match skipped {
            Some(len) => rest = &rest[len..],
            None => return Prolog::Truncated { xml },
        }
    }
}

/// Index of the `>` closing a doctype, skipping quoted strings and the internal subset
fn doctype_end(data: &[u8]) -> Option<usize> {
    let mut quote = None;
    let mut in_subset = false;
    for (i, &b) in data.iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'[') => in_subset = true,
            (None, b']') => in_subset = false,
            (None, b'>') if !in_subset => return Some(i),
            _ => {}
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Whether a content type names SVG, ignoring parameters and case
pub fn is_svg_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(SVG_CONTENT_TYPE))
}

/// Read up to `SNIFF_LENGTH` bytes without losing them
///
/// Returns the prefix and a stream that yields the prefix first, then the rest.
pub async fn peek(mut stream: FileStream) -> io::Result<(Bytes, FileStream)> {
    let mut prefix = BytesMut::new();
    while prefix.len() < SNIFF_LENGTH {
        match stream.next().await {
            Some(chunk) => prefix.extend_from_slice(&chunk?),
            None => break,
        }
    }
    let prefix = prefix.freeze();
    let replay = prefix.clone();
    let stream = stream::once(async move { Ok(replay) })
        .filter(|chunk: &io::Result<Bytes>| {
            let keep = chunk.as_ref().map_or(true, |bytes| !bytes.is_empty());
            async move { keep }
        })
        .chain(stream)
        .boxed();
    Ok((prefix, stream))
}
