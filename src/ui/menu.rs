// SPDX-License-Identifier: MPL-2.0

//! Feed header dropdown and its fade-in.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Profile,
    Logout,
}

impl MenuItem {
    pub const ALL: [MenuItem; 2] = [MenuItem::Profile, MenuItem::Logout];

    pub fn label(self) -> &'static str {
        match self {
            MenuItem::Profile => "Profile",
            MenuItem::Logout => "Logout",
        }
    }
}

/// Linear opacity ramp from 0 to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fade {
    started: Instant,
    length: Duration,
}

impl Fade {
    pub fn start(now: Instant, length: Duration) -> Self {
        Self {
            started: now,
            length,
        }
    }

    pub fn opacity_at(&self, now: Instant) -> f32 {
        if self.length.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.length.as_secs_f32()).min(1.0)
    }
}

#[derive(Debug, Clone)]
pub struct DropdownMenu {
    fade_length: Duration,
    fade: Option<Fade>,
}

impl DropdownMenu {
    /// `fade_length` comes from the theme; zero shows the menu at once.
    pub fn new(fade_length: Duration) -> Self {
        Self {
            fade_length,
            fade: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.fade.is_some()
    }

    pub fn toggle(&mut self, now: Instant) -> bool {
        self.fade = match self.fade {
            Some(_) => None,
            None => Some(Fade::start(now, self.fade_length)),
        };
        self.is_open()
    }

    pub fn close(&mut self) {
        self.fade = None;
    }

    /// 0 when closed.
    pub fn opacity_at(&self, now: Instant) -> f32 {
        self.fade.map_or(0.0, |fade| fade.opacity_at(now))
    }

    /// Pick an entry; the menu closes either way.
    pub fn select(&mut self, item: MenuItem) -> Option<MenuItem> {
        let was_open = self.is_open();
        self.close();
        was_open.then_some(item)
    }
}
