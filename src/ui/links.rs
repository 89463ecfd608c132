// SPDX-License-Identifier: MPL-2.0

//! Link and hashtag detection in post captions.
//!
//! Captions are stored as plain text; spans are found at render time so
//! links can be styled and opened.

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    Link { uri: String },
    Tag { tag: String },
}

/// A detected span, as UTF-8 byte offsets into the caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub byte_start: usize,
    pub byte_end: usize,
    pub kind: SpanKind,
}

/// A piece of caption text ready to style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Plain(&'a str),
    Link(&'a str),
    Tag(&'a str),
}

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^\s<>\[\]\{}|\\^`\x00-\x1f\x7f]+").expect("valid url regex")
});

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s\(\[])#([a-zA-Z][a-zA-Z0-9_]*)").expect("valid hashtag regex")
});

fn overlaps(byte_start: usize, byte_end: usize, existing: &[Span]) -> bool {
    existing
        .iter()
        .any(|s| byte_start < s.byte_end && byte_end > s.byte_start)
}

/// Sentence punctuation after a URL is not part of it.
fn trim_url_trailing(url: &str) -> &str {
    url.trim_end_matches(|c| matches!(c, '.' | ',' | ';' | '!' | '?' | ')'))
}

/// Find links and hashtags, sorted by position. Hashtags inside a link
/// are not reported.
pub fn parse_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();

    for m in URL_RE.find_iter(text) {
        let trimmed = trim_url_trailing(m.as_str());
        spans.push(Span {
            byte_start: m.start(),
            byte_end: m.start() + trimmed.len(),
            kind: SpanKind::Link {
                uri: trimmed.to_string(),
            },
        });
    }

    // The match may include one leading boundary character; group 1 is the tag.
    for caps in HASHTAG_RE.captures_iter(text) {
        let Some(tag) = caps.get(1) else { continue };
        let byte_start = tag.start() - 1;
        let byte_end = tag.end();

        if !overlaps(byte_start, byte_end, &spans) {
            spans.push(Span {
                byte_start,
                byte_end,
                kind: SpanKind::Tag {
                    tag: tag.as_str().to_string(),
                },
            });
        }
    }

    spans.sort_by_key(|s| s.byte_start);
    spans
}

/// Split a caption into plain, link and tag pieces covering all of it.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0;

    for span in parse_spans(text) {
        if span.byte_start > cursor {
            out.push(Segment::Plain(&text[cursor..span.byte_start]));
        }
        let piece = &text[span.byte_start..span.byte_end];
        out.push(match span.kind {
            SpanKind::Link { .. } => Segment::Link(piece),
            SpanKind::Tag { .. } => Segment::Tag(piece),
        });
        cursor = span.byte_end;
    }
    if cursor < text.len() {
        out.push(Segment::Plain(&text[cursor..]));
    }
    out
}

/// First link in a caption, if any.
pub fn first_link(text: &str) -> Option<String> {
    parse_spans(text).into_iter().find_map(|s| match s.kind {
        SpanKind::Link { uri } => Some(uri),
        SpanKind::Tag { .. } => None,
    })
}
