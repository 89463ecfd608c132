// SPDX-License-Identifier: MPL-2.0

//! Headless view layer: what each screen shows, given store state.

pub mod links;
mod menu;
mod navigation;
mod notice;
pub mod render;
pub mod screens;
mod theme;

pub use menu::{DropdownMenu, Fade, MenuItem};
pub use navigation::{Navigator, POST_LOGOUT_ROUTE, Route};
pub use notice::{Notice, NoticeKind, Notices};
pub use screens::{HOME_ENTRIES, LoginForm, ProfileForm};
pub use theme::{Palette, Theme, Tone};
