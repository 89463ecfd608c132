// SPDX-License-Identifier: MPL-2.0

//! Styling handed explicitly to every render function.

use crate::config::MENU_FADE;
use crate::state::AppSettings;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Title,
    Text,
    Muted,
    Accent,
    Link,
    Tag,
    Success,
    Error,
}

/// ANSI SGR parameters for each tone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub title: &'static str,
    pub text: &'static str,
    pub muted: &'static str,
    pub accent: &'static str,
    pub link: &'static str,
    pub tag: &'static str,
    pub success: &'static str,
    pub error: &'static str,
}

impl Palette {
    /// White on black, like the mobile app.
    pub fn dark() -> Self {
        Self {
            title: "1;97",
            text: "97",
            muted: "37",
            accent: "1;96",
            link: "4;96",
            tag: "36",
            success: "32",
            error: "1;31",
        }
    }

    fn code(&self, tone: Tone) -> &'static str {
        match tone {
            Tone::Title => self.title,
            Tone::Text => self.text,
            Tone::Muted => self.muted,
            Tone::Accent => self.accent,
            Tone::Link => self.link,
            Tone::Tag => self.tag,
            Tone::Success => self.success,
            Tone::Error => self.error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub palette: Palette,
    /// Emit escape codes; off when output is not a terminal
    pub color: bool,
    pub reduce_motion: bool,
    pub menu_fade: Duration,
    /// Widest a rendered line may get, in graphemes
    pub width: usize,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            palette: Palette::dark(),
            color: true,
            reduce_motion: false,
            menu_fade: MENU_FADE,
            width: 72,
        }
    }
}

impl Theme {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            reduce_motion: settings.reduce_motion,
            ..Self::default()
        }
    }

    /// No escape codes, for logs and tests.
    pub fn plain() -> Self {
        Self {
            color: false,
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Fade length to use, zero when motion is reduced.
    pub fn fade(&self) -> Duration {
        if self.reduce_motion {
            Duration::ZERO
        } else {
            self.menu_fade
        }
    }

    pub fn paint(&self, tone: Tone, text: &str) -> String {
        if !self.color || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{}m{}\x1b[0m", self.palette.code(tone), text)
    }
}
