// SPDX-License-Identifier: MPL-2.0

//! Text helpers shared by the screens.

use crate::backend::Post;
use crate::ui::links::{Segment, segments};
use crate::ui::theme::{Theme, Tone};
use chrono::{DateTime, Utc};
use unicode_segmentation::UnicodeSegmentation;

/// Short age of a post: "now", "5m", "3h", "2d", then the date.
pub fn relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(created_at);

    if duration.num_seconds() < 60 {
        "now".to_string()
    } else if duration.num_minutes() < 60 {
        format!("{}m", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d", duration.num_days())
    } else {
        created_at.format("%b %d").to_string()
    }
}

/// Cut `text` to at most `max` graphemes, ending in an ellipsis when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.graphemes(true).count() <= max {
        return text.to_string();
    }
    let kept: String = text.graphemes(true).take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// Up to two initials for the avatar placeholder.
pub fn initials(name: &str) -> String {
    let local = name.split('@').next().unwrap_or(name);
    let mut out: String = local
        .split(|c: char| c.is_whitespace() || c == '.' || c == '_' || c == '-')
        .filter_map(|word| word.graphemes(true).next())
        .take(2)
        .collect();
    if out.is_empty() {
        out.push('?');
    }
    out.to_uppercase()
}

pub fn caption(theme: &Theme, text: &str) -> String {
    segments(text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Plain(s) => theme.paint(Tone::Text, s),
            Segment::Link(s) => theme.paint(Tone::Link, s),
            Segment::Tag(s) => theme.paint(Tone::Tag, s),
        })
        .collect()
}

pub fn post(theme: &Theme, post: &Post, now: DateTime<Utc>) -> String {
    let author = truncate(&post.author_display_name, theme.width / 2);
    let header = format!(
        "{}  {}",
        theme.paint(Tone::Muted, &author),
        theme.paint(Tone::Muted, &relative_time(post.created_at, now))
    );
    let counts = theme.paint(
        Tone::Muted,
        &format!(
            "♥ {}   💬 {}   ⟲ {}",
            post.like_count, post.comment_count, post.repost_count
        ),
    );
    format!("{header}\n{}\n{counts}", caption(theme, &post.caption))
}

/// A labelled input line; `masked` hides the value.
pub fn field(theme: &Theme, label: &str, value: &str, masked: bool) -> String {
    let shown = if value.is_empty() {
        theme.paint(Tone::Muted, "(empty)")
    } else if masked {
        "•".repeat(value.graphemes(true).count())
    } else {
        theme.paint(Tone::Text, value)
    };
    format!("{}: {shown}", theme.paint(Tone::Muted, label))
}

pub fn rule(theme: &Theme) -> String {
    theme.paint(Tone::Muted, &"─".repeat(theme.width))
}
