// SPDX-License-Identifier: MPL-2.0

//! One render function per screen. Each takes the theme and the state it
//! shows and returns the text to print; none of them touch the stores.

use crate::backend::Profile;
use crate::scan::{Payload, ScanFlow, ScanState, SUPPORTED_BARCODES};
use crate::store::{FeedSnapshot, ProfileSnapshot};
use crate::ui::menu::{DropdownMenu, MenuItem};
use crate::ui::navigation::Route;
use crate::ui::notice::{Notice, NoticeKind};
use crate::ui::render;
use crate::ui::theme::{Theme, Tone};
use chrono::{DateTime, Utc};
use std::time::Instant;

/// Entries on the home screen, in display order.
pub const HOME_ENTRIES: [(&str, Route); 3] = [
    ("Scan Barcode", Route::Camera),
    ("Shop", Route::Shop),
    ("Social Feed", Route::Feed),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Editable copy of the profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub username: String,
    pub bio: String,
    pub avatar_url: String,
}

impl ProfileForm {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            username: profile.username.clone(),
            bio: profile.bio.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }

    /// The profile to save. `user_id` is filled in by the store.
    pub fn to_profile(&self) -> Profile {
        Profile {
            user_id: String::new(),
            username: self.username.trim().to_string(),
            bio: self.bio.trim().to_string(),
            avatar_url: self.avatar_url.trim().to_string(),
            updated_at: None,
        }
    }
}

fn title(theme: &Theme, route: Route) -> String {
    theme.paint(Tone::Title, route.title())
}

fn button(theme: &Theme, key: &str, label: &str) -> String {
    format!("[{}] {}", theme.paint(Tone::Accent, key), label)
}

pub fn notice(theme: &Theme, notice: &Notice) -> String {
    let tone = match notice.kind {
        NoticeKind::Info => Tone::Accent,
        NoticeKind::Success => Tone::Success,
        NoticeKind::Error => Tone::Error,
    };
    let mut out = format!("{}: {}", theme.paint(tone, &notice.title), notice.message);
    if notice.retryable {
        out.push_str(&theme.paint(Tone::Muted, " (try again)"));
    }
    out.push_str(&theme.paint(Tone::Muted, "  [ok]"));
    out
}

pub fn login(theme: &Theme, form: &LoginForm) -> String {
    [
        title(theme, Route::Login),
        String::new(),
        render::field(theme, "Email", &form.email, false),
        render::field(theme, "Password", &form.password, true),
        String::new(),
        button(theme, "login", "Login"),
        button(theme, "signup", "Sign Up"),
    ]
    .join("\n")
}

pub fn home(theme: &Theme) -> String {
    let mut lines = vec![title(theme, Route::Home), String::new()];
    for (i, (label, _)) in HOME_ENTRIES.iter().enumerate() {
        lines.push(button(theme, &(i + 1).to_string(), label));
    }
    lines.push(String::new());
    lines.push(button(theme, "logout", "Logout"));
    lines.join("\n")
}

pub fn feed(
    theme: &Theme,
    snapshot: &FeedSnapshot,
    menu: &DropdownMenu,
    now: Instant,
    wall_clock: DateTime<Utc>,
) -> String {
    let mut lines = vec![format!(
        "{}{}",
        title(theme, Route::Feed),
        theme.paint(Tone::Muted, "   [menu]")
    )];

    if menu.is_open() {
        // Items are muted until the fade finishes.
        let tone = if menu.opacity_at(now) >= 1.0 {
            Tone::Text
        } else {
            Tone::Muted
        };
        for item in MenuItem::ALL {
            lines.push(format!("  > {}", theme.paint(tone, item.label())));
        }
    }
    lines.push(render::rule(theme));

    if snapshot.loading && snapshot.posts.is_empty() {
        lines.push(theme.paint(Tone::Muted, "Loading…"));
    } else if snapshot.posts.is_empty() {
        lines.push(theme.paint(Tone::Muted, "No posts yet."));
    }
    for post in &snapshot.posts {
        lines.push(render::post(theme, post, wall_clock));
        lines.push(render::rule(theme));
    }

    let compose = if snapshot.draft.is_empty() {
        theme.paint(Tone::Muted, "What's on your mind?")
    } else {
        theme.paint(Tone::Text, &snapshot.draft)
    };
    lines.push(compose);
    lines.push(if snapshot.posting {
        theme.paint(Tone::Muted, "Posting…")
    } else {
        button(theme, "post", "Post")
    });
    lines.join("\n")
}

pub fn profile(theme: &Theme, snapshot: &ProfileSnapshot, form: &ProfileForm) -> String {
    let mut lines = vec![title(theme, Route::Profile), String::new()];

    if snapshot.loading {
        lines.push(theme.paint(Tone::Muted, "Loading…"));
        return lines.join("\n");
    }

    let avatar = if form.avatar_url.is_empty() {
        format!("( {} )", render::initials(&form.username))
    } else {
        theme.paint(Tone::Link, &form.avatar_url)
    };
    lines.push(format!("{} {avatar}", theme.paint(Tone::Muted, "Avatar:")));
    lines.push(render::field(theme, "Username", &form.username, false));
    lines.push(render::field(theme, "Bio", &form.bio, false));
    lines.push(String::new());
    lines.push(if snapshot.saving {
        theme.paint(Tone::Muted, "Saving…")
    } else {
        button(theme, "save", "Save Profile")
    });
    lines.push(button(theme, "logout", "Logout"));
    lines.join("\n")
}

pub fn camera(theme: &Theme, flow: &ScanFlow) -> String {
    let mut lines = vec![title(theme, Route::Camera), String::new()];

    match flow.state() {
        ScanState::AwaitingPermission | ScanState::Denied => {
            lines.push("Camera permission is required.".to_string());
            lines.push(button(theme, "grant", "Grant Permission"));
        }
        ScanState::Scanning => {
            let kinds: Vec<&str> = SUPPORTED_BARCODES.iter().map(|k| k.as_str()).collect();
            lines.push(theme.paint(
                Tone::Muted,
                &format!("Scanning with the {} camera", flow.facing().label()),
            ));
            lines.push(theme.paint(Tone::Muted, &format!("Reads {}", kinds.join(", "))));
            lines.push(button(theme, "flip", "Flip"));
        }
        ScanState::Captured(capture) => {
            lines.push(theme.paint(Tone::Title, "Scanned Data:"));
            let tone = match capture.payload {
                Payload::Url(_) => Tone::Link,
                Payload::Text(_) => Tone::Accent,
            };
            lines.push(theme.paint(tone, capture.payload.as_str()));
            lines.push(button(theme, "again", "Scan Again"));
        }
    }
    lines.join("\n")
}

pub fn shop(theme: &Theme) -> String {
    [
        title(theme, Route::Shop),
        String::new(),
        theme.paint(Tone::Muted, "Coming soon."),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Post;
    use crate::config::MENU_FADE;
    use crate::scan::testing::RecordingOpener;
    use crate::scan::BarcodeType;
    use std::sync::Arc;

    fn sample_post(id: &str, caption: &str) -> Post {
        Post {
            id: id.into(),
            author_user_id: "user-1".into(),
            author_display_name: "a@example.com".into(),
            caption: caption.into(),
            like_count: 0,
            comment_count: 0,
            repost_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_home_lists_three_entries() {
        let text = home(&Theme::plain());
        assert!(text.contains("[1] Scan Barcode"));
        assert!(text.contains("[2] Shop"));
        assert!(text.contains("[3] Social Feed"));
    }

    #[test]
    fn test_login_masks_password() {
        let form = LoginForm {
            email: "a@example.com".into(),
            password: "secret".into(),
        };
        let text = login(&Theme::plain(), &form);
        assert!(text.contains("a@example.com"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_feed_shows_posts_in_order_and_menu() {
        let snapshot = FeedSnapshot {
            posts: vec![sample_post("2", "second"), sample_post("1", "first")],
            ..FeedSnapshot::default()
        };
        let now = Instant::now();
        let mut menu = DropdownMenu::new(MENU_FADE);
        menu.toggle(now);

        let text = feed(&Theme::plain(), &snapshot, &menu, now, Utc::now());

        let second = text.find("second").unwrap();
        let first = text.find("first").unwrap();
        assert!(second < first);
        assert!(text.contains("> Profile"));
        assert!(text.contains("> Logout"));
        assert!(text.contains("What's on your mind?"));
    }

    #[test]
    fn test_empty_feed() {
        let menu = DropdownMenu::new(MENU_FADE);
        let text = feed(
            &Theme::plain(),
            &FeedSnapshot::default(),
            &menu,
            Instant::now(),
            Utc::now(),
        );
        assert!(text.contains("No posts yet."));
        assert!(!text.contains("> Logout"));
    }

    #[test]
    fn test_profile_avatar_placeholder() {
        let form = ProfileForm {
            username: "Ana Lopez".into(),
            ..ProfileForm::default()
        };
        let text = profile(&Theme::plain(), &ProfileSnapshot::default(), &form);
        assert!(text.contains("( AL )"));
    }

    #[test]
    fn test_profile_form_trims_fields() {
        let form = ProfileForm {
            username: "  ana ".into(),
            bio: "hi\n".into(),
            avatar_url: String::new(),
        };
        let profile = form.to_profile();
        assert_eq!(profile.username, "ana");
        assert_eq!(profile.bio, "hi");
    }

    #[test]
    fn test_camera_screens_follow_flow() {
        let theme = Theme::plain();
        let mut flow = ScanFlow::new(Arc::new(RecordingOpener::default()));
        assert!(camera(&theme, &flow).contains("Grant Permission"));

        flow.resolve_permission(true);
        assert!(camera(&theme, &flow).contains("back camera"));

        flow.on_scanned(BarcodeType::UpcA, "012345678905");
        let text = camera(&theme, &flow);
        assert!(text.contains("Scanned Data:"));
        assert!(text.contains("012345678905"));
        assert!(text.contains("Scan Again"));
    }

    #[test]
    fn test_retryable_notice_hint() {
        let notice_text = notice(
            &Theme::plain(),
            &Notice::from_store_error(&crate::store::StoreError::Timeout),
        );
        assert_eq!(notice_text, "Error: request timed out (try again)  [ok]");
    }
}
